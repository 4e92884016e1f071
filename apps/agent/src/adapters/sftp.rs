//! SFTP source adapter: SSH session over TCP, fetch one file, decode.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::Session;
use tracing::info;

use datalink_wire::{FileConfig, FtpConfig};

use crate::error::{AgentError, AgentResult};
use crate::parser;

use super::{glob_match, has_wildcard, BatchEmitter};

/// TCP dial timeout for the SSH transport.
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(ftp: &FtpConfig, file: &FileConfig, emitter: &BatchEmitter) -> AgentResult<()> {
    if ftp.host.is_empty() {
        return Err(AgentError::Source("sftp host is not configured".into()));
    }

    let ftp = ftp.clone();
    let pattern = file.pattern.clone();
    let (data, name) = tokio::task::spawn_blocking(move || fetch_file(&ftp, &pattern))
        .await
        .map_err(|e| AgentError::Source(e.to_string()))??;

    info!(file = %name, bytes = data.len(), "sftp file downloaded, parsing");
    let records = parser::parse_file(&data, &file.format, file.has_header, &file.delimiter)?;

    info!(total = records.len(), "sftp extraction finished");
    emitter.emit(records).await
}

/// Open the SSH session and authenticate with the private key when one
/// is configured, password otherwise. Blocking; runs on the blocking
/// pool.
pub fn open_session(config: &FtpConfig) -> AgentResult<(Session, ssh2::Sftp)> {
    // the shared bundle defaults to the FTP port; correct it here
    let port = match config.port.as_str() {
        "" | "21" => "22",
        other => other,
    };

    let addr = format!("{}:{}", config.host, port)
        .to_socket_addrs()
        .map_err(|e| AgentError::Source(format!("sftp address: {}", e)))?
        .next()
        .ok_or_else(|| AgentError::Source("sftp address did not resolve".into()))?;

    let tcp = TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)
        .map_err(|e| AgentError::Source(format!("sftp connect failed: {}", e)))?;

    let mut session = Session::new().map_err(|e| AgentError::Source(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| AgentError::Source(format!("ssh handshake failed: {}", e)))?;

    if !config.private_key.is_empty() {
        session
            .userauth_pubkey_memory(&config.user, None, &config.private_key, None)
            .map_err(|e| AgentError::Source(format!("ssh key auth failed: {}", e)))?;
    } else {
        session
            .userauth_password(&config.user, &config.password)
            .map_err(|e| AgentError::Source(format!("ssh password auth failed: {}", e)))?;
    }

    let sftp = session
        .sftp()
        .map_err(|e| AgentError::Source(format!("sftp subsystem failed: {}", e)))?;

    Ok((session, sftp))
}

pub fn fetch_file(config: &FtpConfig, pattern: &str) -> AgentResult<(Vec<u8>, String)> {
    let (_session, sftp) = open_session(config)?;

    let dir = if config.path.is_empty() { "/" } else { &config.path };
    let name = resolve_name(&sftp, dir, pattern)?;
    let full_path = Path::new(dir).join(&name);

    let mut file = sftp
        .open(&full_path)
        .map_err(|e| AgentError::Source(format!("sftp open failed: {}", e)))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| AgentError::Source(format!("sftp read failed: {}", e)))?;

    Ok((data, name))
}

/// List the configured directory (connection probe).
pub fn list_dir(config: &FtpConfig) -> AgentResult<Vec<String>> {
    let (_session, sftp) = open_session(config)?;
    let dir = if config.path.is_empty() { "/" } else { &config.path };
    read_dir_names(&sftp, dir)
}

fn read_dir_names(sftp: &ssh2::Sftp, dir: &str) -> AgentResult<Vec<String>> {
    let entries = sftp
        .readdir(Path::new(dir))
        .map_err(|e| AgentError::Source(format!("sftp list failed: {}", e)))?;

    Ok(entries
        .into_iter()
        .filter_map(|(path, _stat)| file_name(&path))
        .collect())
}

fn resolve_name(sftp: &ssh2::Sftp, dir: &str, pattern: &str) -> AgentResult<String> {
    if pattern.is_empty() {
        return Err(AgentError::Source("file pattern is not configured".into()));
    }
    if !has_wildcard(pattern) {
        return Ok(pattern.to_string());
    }

    read_dir_names(sftp, dir)?
        .into_iter()
        .find(|n| glob_match(pattern, n))
        .ok_or_else(|| AgentError::Source(format!("no file matching '{}' in {}", pattern, dir)))
}

fn file_name(path: &PathBuf) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
