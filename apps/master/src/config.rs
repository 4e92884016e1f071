//! Master configuration loaded from environment variables.

use std::env;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_STORE_PATH: &str = "data/master.db";
    pub const DEV_HTTP_HOST: &str = "127.0.0.1";
    pub const DEV_HTTP_PORT: u16 = 8080;
    pub const DEV_AGENT_PORT: u16 = 447;

    // Target sink pool sizing: 25 open / 10 idle / 1h lifetime.
    pub const SINK_MAX_CONNECTIONS: u32 = 25;
    pub const SINK_MIN_CONNECTIONS: u32 = 10;
    pub const SINK_MAX_LIFETIME_SECS: u64 = 3600;

    pub const TARGET_DB_DRIVER: &str = "postgres";
    pub const TARGET_DB_PORT: &str = "5432";
    pub const TARGET_DB_SSLMODE: &str = "disable";
}

/// Embedded entity-store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// SQLite database file path; `:memory:` is honored for tests.
    pub path: String,
}

impl StoreSettings {
    pub fn connection_url(&self) -> String {
        if self.path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.path)
        }
    }
}

/// Operator HTTP API settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl HttpSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Agent TCP listener settings.
#[derive(Debug, Clone)]
pub struct AgentListenerSettings {
    pub port: u16,
    pub tls_enabled: bool,
    pub tls_cert_path: String,
    pub tls_key_path: String,
}

/// Target sink connection parameters. Settings-table rows override these
/// env-derived values at startup.
#[derive(Debug, Clone, Default)]
pub struct TargetDbSettings {
    pub driver: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub db_name: String,
    pub sslmode: String,
}

impl TargetDbSettings {
    /// The sink is optional; an empty host leaves it disabled.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

/// Master configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreSettings,
    pub http: HttpSettings,
    pub agent_listener: AgentListenerSettings,
    pub target_db: TargetDbSettings,
    pub log_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MASTER_DB_PATH`: embedded store location (default: data/master.db)
    /// - `HTTP_HOST` / `HTTP_PORT`: operator API bind (default: 127.0.0.1:8080)
    /// - `AGENT_PORT`: agent listener port (default: 447)
    /// - `TLS_ENABLED`, `TLS_CERT_PATH`, `TLS_KEY_PATH`: agent-port TLS
    /// - `TARGET_DB_DRIVER|HOST|PORT|USER|PASSWORD|NAME|SSLMODE`: sink
    ///   fallback when Settings rows are absent
    /// - `LOG_LEVEL`, `LOG_FILE`: tracing filter and optional file output
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = StoreSettings {
            path: env::var("MASTER_DB_PATH").unwrap_or_else(|_| defaults::DEV_STORE_PATH.into()),
        };

        let http = HttpSettings {
            host: env::var("HTTP_HOST").unwrap_or_else(|_| defaults::DEV_HTTP_HOST.into()),
            port: parse_port("HTTP_PORT", defaults::DEV_HTTP_PORT)?,
        };

        let tls_enabled = env_flag("TLS_ENABLED");
        let agent_listener = AgentListenerSettings {
            port: parse_port("AGENT_PORT", defaults::DEV_AGENT_PORT)?,
            tls_enabled,
            tls_cert_path: env::var("TLS_CERT_PATH").unwrap_or_else(|_| "certs/server.crt".into()),
            tls_key_path: env::var("TLS_KEY_PATH").unwrap_or_else(|_| "certs/server.key".into()),
        };

        if tls_enabled {
            for path in [&agent_listener.tls_cert_path, &agent_listener.tls_key_path] {
                if !std::path::Path::new(path).exists() {
                    return Err(ConfigError::MissingTlsMaterial(path.clone()));
                }
            }
        }

        let target_db = TargetDbSettings {
            driver: env::var("TARGET_DB_DRIVER")
                .unwrap_or_else(|_| defaults::TARGET_DB_DRIVER.into()),
            host: env::var("TARGET_DB_HOST").unwrap_or_default(),
            port: env::var("TARGET_DB_PORT").unwrap_or_else(|_| defaults::TARGET_DB_PORT.into()),
            user: env::var("TARGET_DB_USER").unwrap_or_default(),
            password: env::var("TARGET_DB_PASSWORD").unwrap_or_default(),
            db_name: env::var("TARGET_DB_NAME").unwrap_or_default(),
            sslmode: env::var("TARGET_DB_SSLMODE")
                .unwrap_or_else(|_| defaults::TARGET_DB_SSLMODE.into()),
        };

        Ok(Config {
            store,
            http,
            agent_listener,
            target_db,
            log_file: env::var("LOG_FILE").ok(),
        })
    }
}

fn parse_port(var: &'static str, default: u16) -> Result<u16, ConfigError> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(var)),
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

    #[error("TLS enabled but {0} does not exist")]
    MissingTlsMaterial(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_is_host_port() {
        let http = HttpSettings {
            host: "0.0.0.0".into(),
            port: 9000,
        };
        assert_eq!(http.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn memory_store_url() {
        let store = StoreSettings {
            path: ":memory:".into(),
        };
        assert_eq!(store.connection_url(), "sqlite::memory:");

        let store = StoreSettings {
            path: "data/master.db".into(),
        };
        assert_eq!(store.connection_url(), "sqlite://data/master.db?mode=rwc");
    }

    #[test]
    fn unconfigured_sink_is_disabled() {
        let target = TargetDbSettings::default();
        assert!(!target.is_configured());

        let target = TargetDbSettings {
            host: "db.internal".into(),
            ..Default::default()
        };
        assert!(target.is_configured());
    }
}
