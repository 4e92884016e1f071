//! Agent configuration loaded from environment variables.

use std::env;

use datalink_wire::DbConfig;

/// TLS settings for the master connection.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub enabled: bool,
    /// Pinned CA bundle; empty falls back to the system roots.
    pub ca_path: String,
    /// Accept any certificate. Logged loudly as insecure.
    pub skip_verify: bool,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub master_host: String,
    pub master_port: u16,
    pub agent_name: String,
    /// Bearer token issued from the master console; empty when the
    /// master has no token on file for this agent.
    pub agent_token: String,
    pub sync_enabled: bool,
    pub tls: TlsSettings,
    /// Default source database, used when a RUN_JOB carries an empty
    /// db_config block.
    pub default_db: DbConfig,
    pub log_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MASTER_HOST` / `MASTER_PORT`: master agent port (default: localhost:447)
    /// - `AGENT_NAME`: logical name presented at REGISTER (default: tenant-1)
    /// - `AGENT_TOKEN`: bearer token from the master console
    /// - `SYNC_ENABLED`: advertise database sync in REGISTER
    /// - `TLS_ENABLED`, `TLS_CA_PATH`, `TLS_SKIP_VERIFY`: TLS to master
    /// - `DB_DRIVER|HOST|PORT|USER|PASSWORD|NAME|SSLMODE`: default source
    /// - `LOG_LEVEL`, `LOG_FILE`: tracing filter and optional file output
    pub fn from_env() -> Result<Self, ConfigError> {
        let master_port = match env::var("MASTER_PORT") {
            Err(_) => 447,
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MASTER_PORT"))?,
        };

        Ok(Config {
            master_host: env::var("MASTER_HOST").unwrap_or_else(|_| "localhost".into()),
            master_port,
            agent_name: env::var("AGENT_NAME").unwrap_or_else(|_| "tenant-1".into()),
            agent_token: env::var("AGENT_TOKEN").unwrap_or_default(),
            sync_enabled: env_flag("SYNC_ENABLED"),
            tls: TlsSettings {
                enabled: env_flag("TLS_ENABLED"),
                ca_path: env::var("TLS_CA_PATH").unwrap_or_default(),
                skip_verify: env_flag("TLS_SKIP_VERIFY"),
            },
            default_db: DbConfig {
                driver: env::var("DB_DRIVER").unwrap_or_else(|_| "postgres".into()),
                host: env::var("DB_HOST").unwrap_or_default(),
                port: env::var("DB_PORT").unwrap_or_else(|_| "5432".into()),
                user: env::var("DB_USER").unwrap_or_default(),
                password: env::var("DB_PASSWORD").unwrap_or_default(),
                db_name: env::var("DB_NAME").unwrap_or_default(),
                sslmode: env::var("DB_SSLMODE").unwrap_or_else(|_| "disable".into()),
            },
            log_file: env::var("LOG_FILE").ok(),
        })
    }

    pub fn master_address(&self) -> String {
        format!("{}:{}", self.master_host, self.master_port)
    }
}

fn env_flag(var: &str) -> bool {
    env::var(var)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}")]
    InvalidValue(&'static str),
}
