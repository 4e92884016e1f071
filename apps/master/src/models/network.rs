//! Network (source endpoint) domain models and DTOs.

use serde::{Deserialize, Serialize};

/// Whether the owning agent currently holds a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of source behind a network. Exactly one connection-parameter
/// block is honored per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Database,
    Ftp,
    Sftp,
    Api,
    Mongodb,
    Redis,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Ftp => "ftp",
            Self::Sftp => "sftp",
            Self::Api => "api",
            Self::Mongodb => "mongodb",
            Self::Redis => "redis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "database" => Some(Self::Database),
            "ftp" => Some(Self::Ftp),
            "sftp" => Some(Self::Sftp),
            "api" => Some(Self::Api),
            "mongodb" => Some(Self::Mongodb),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Create/update payload for a network. All connection blocks are
/// accepted; only the one matching `source_type` is used at dispatch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertNetworkRequest {
    pub name: String,
    /// Overrides `name` as the command-routing key when set.
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub ip_address: String,
    pub source_type: SourceType,

    #[serde(default)]
    pub db_driver: String,
    #[serde(default)]
    pub db_host: String,
    #[serde(default)]
    pub db_port: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub db_sslmode: String,

    #[serde(default)]
    pub ftp_host: String,
    #[serde(default)]
    pub ftp_port: String,
    #[serde(default)]
    pub ftp_user: String,
    #[serde(default)]
    pub ftp_password: String,
    #[serde(default)]
    pub ftp_private_key: String,
    #[serde(default)]
    pub ftp_path: String,
    #[serde(default)]
    pub ftp_passive: bool,

    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_method: String,
    #[serde(default)]
    pub api_headers: String,
    #[serde(default)]
    pub api_auth_type: String,
    #[serde(default)]
    pub api_auth_key: String,
    #[serde(default)]
    pub api_auth_value: String,
    #[serde(default)]
    pub api_body: String,

    #[serde(default)]
    pub mongo_host: String,
    #[serde(default)]
    pub mongo_port: String,
    #[serde(default)]
    pub mongo_user: String,
    #[serde(default)]
    pub mongo_password: String,
    #[serde(default)]
    pub mongo_database: String,
    #[serde(default)]
    pub mongo_collection: String,
    #[serde(default)]
    pub mongo_auth_db: String,

    #[serde(default)]
    pub redis_host: String,
    #[serde(default)]
    pub redis_port: String,
    #[serde(default)]
    pub redis_password: String,
    #[serde(default)]
    pub redis_db: i64,
    #[serde(default)]
    pub redis_pattern: String,
}

impl Default for SourceType {
    fn default() -> Self {
        Self::Database
    }
}
