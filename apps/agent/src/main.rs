//! Datalink agent - main entry point.
//!
//! Exit code 0 on graceful shutdown after a successful registration;
//! 1 on fatal startup errors (master unreachable, registration
//! rejected, reconnect exhaustion).

mod adapters;
mod config;
mod error;
mod parser;
mod probe;
mod session;
mod shell;
mod tls;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let _log_guard = match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path.parent().unwrap_or(std::path::Path::new(".")).to_path_buf();
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "agent.log".into());
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, file),
            );
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        agent = %config.agent_name,
        master = %config.master_address(),
        sync_enabled = config.sync_enabled,
        tls = config.tls.enabled,
        "starting tenant agent"
    );

    if let Err(e) = session::run(config).await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }
}
