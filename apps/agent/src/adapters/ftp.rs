//! FTP source adapter: fetch one file (direct path or first glob
//! match), then decode it with the schema's parsing hints.

use std::net::ToSocketAddrs;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::info;

use datalink_wire::{FileConfig, FtpConfig};

use crate::error::{AgentError, AgentResult};
use crate::parser;

use super::{glob_match, has_wildcard, BatchEmitter};

/// Control-connection dial timeout.
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(ftp: &FtpConfig, file: &FileConfig, emitter: &BatchEmitter) -> AgentResult<()> {
    if ftp.host.is_empty() {
        return Err(AgentError::Source("ftp host is not configured".into()));
    }

    let ftp = ftp.clone();
    let pattern = file.pattern.clone();
    let (data, name) = tokio::task::spawn_blocking(move || fetch_file(&ftp, &pattern))
        .await
        .map_err(|e| AgentError::Source(e.to_string()))??;

    info!(file = %name, bytes = data.len(), "ftp file downloaded, parsing");
    let records = parser::parse_file(&data, &file.format, file.has_header, &file.delimiter)?;

    info!(total = records.len(), "ftp extraction finished");
    emitter.emit(records).await
}

/// Connect, resolve the file name, and download it. Blocking; runs on
/// the blocking pool.
pub fn fetch_file(config: &FtpConfig, pattern: &str) -> AgentResult<(Vec<u8>, String)> {
    let mut stream = connect(config)?;

    let dir = if config.path.is_empty() { "/" } else { &config.path };
    let name = resolve_name(&mut stream, dir, pattern)?;
    let full_path = join_remote(dir, &name);

    let cursor = stream
        .retr_as_buffer(&full_path)
        .map_err(|e| AgentError::Source(format!("ftp download failed: {}", e)))?;
    let _ = stream.quit();

    Ok((cursor.into_inner(), name))
}

pub fn connect(config: &FtpConfig) -> AgentResult<FtpStream> {
    let port = if config.port.is_empty() { "21" } else { &config.port };
    let addr = format!("{}:{}", config.host, port)
        .to_socket_addrs()
        .map_err(|e| AgentError::Source(format!("ftp address: {}", e)))?
        .next()
        .ok_or_else(|| AgentError::Source("ftp address did not resolve".into()))?;

    let mut stream = FtpStream::connect_timeout(addr, DIAL_TIMEOUT)
        .map_err(|e| AgentError::Source(format!("ftp connect failed: {}", e)))?;

    stream
        .login(&config.user, &config.password)
        .map_err(|e| AgentError::Source(format!("ftp login failed: {}", e)))?;

    if config.passive {
        stream.set_mode(Mode::Passive);
    }
    stream
        .transfer_type(FileType::Binary)
        .map_err(|e| AgentError::Source(e.to_string()))?;

    Ok(stream)
}

/// List the configured directory (connection probe).
pub fn list_dir(config: &FtpConfig) -> AgentResult<Vec<String>> {
    let mut stream = connect(config)?;
    let dir = if config.path.is_empty() { "/" } else { &config.path };
    let names = stream
        .nlst(Some(dir))
        .map_err(|e| AgentError::Source(format!("ftp list failed: {}", e)))?;
    let _ = stream.quit();
    Ok(names)
}

fn resolve_name(stream: &mut FtpStream, dir: &str, pattern: &str) -> AgentResult<String> {
    if pattern.is_empty() {
        return Err(AgentError::Source("file pattern is not configured".into()));
    }
    if !has_wildcard(pattern) {
        return Ok(pattern.to_string());
    }

    let names = stream
        .nlst(Some(dir))
        .map_err(|e| AgentError::Source(format!("ftp list failed: {}", e)))?;

    names
        .iter()
        .map(|n| base_name(n))
        .find(|n| glob_match(pattern, n))
        .map(|n| n.to_string())
        .ok_or_else(|| AgentError::Source(format!("no file matching '{}' in {}", pattern, dir)))
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_paths_join_cleanly() {
        assert_eq!(join_remote("/", "a.csv"), "/a.csv");
        assert_eq!(join_remote("", "a.csv"), "/a.csv");
        assert_eq!(join_remote("/data", "a.csv"), "/data/a.csv");
        assert_eq!(join_remote("/data/", "a.csv"), "/data/a.csv");
    }

    #[test]
    fn listing_entries_reduce_to_base_names() {
        assert_eq!(base_name("/data/report.csv"), "report.csv");
        assert_eq!(base_name("report.csv"), "report.csv");
    }
}
