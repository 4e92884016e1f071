//! Source configuration bundles.
//!
//! A `RUN_JOB` frame carries six parallel config bundles; the agent picks
//! the one named by `source_type`. On the wire the bundles stay parallel
//! for compatibility; internally they collapse into the tagged
//! [`SourceConfig`] variant at the decode boundary.

use serde::{Deserialize, Serialize};

/// SQL source/target connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// postgres, mysql, sqlserver, oracle
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub sslmode: String,
}

impl DbConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

/// FTP and SFTP share one bundle; `private_key` only applies to SFTP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub passive: bool,
}

/// File-parsing hints from the Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// csv, tsv, txt, xlsx, json
    #[serde(default = "FileConfig::default_format")]
    pub format: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default = "FileConfig::default_has_header")]
    pub has_header: bool,
    #[serde(default = "FileConfig::default_delimiter")]
    pub delimiter: String,
}

impl FileConfig {
    fn default_format() -> String {
        "csv".into()
    }
    fn default_has_header() -> bool {
        true
    }
    fn default_delimiter() -> String {
        ",".into()
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
            pattern: String::new(),
            has_header: Self::default_has_header(),
            delimiter: Self::default_delimiter(),
        }
    }
}

/// HTTP API source parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    /// JSON object of extra request headers, serialized as a string the
    /// way the operator console stores it.
    #[serde(default)]
    pub headers: String,
    /// none, bearer, basic, api_key
    #[serde(default)]
    pub auth_type: String,
    /// Header name when auth_type = api_key.
    #[serde(default)]
    pub auth_key: String,
    #[serde(default)]
    pub auth_value: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub auth_db: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub pattern: String,
}

/// `RUN_JOB` payload: identifiers plus the six parallel bundles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunJobData {
    pub job_id: i64,
    pub log_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_type: String,
    /// SQL text or source query (Mongo JSON filter, Redis pattern).
    #[serde(default)]
    pub query: String,
    /// Echoed back so the master can identify the sink on the return
    /// path; the agent itself does not use them.
    #[serde(default)]
    pub target_table: String,
    #[serde(default)]
    pub unique_key_column: String,
    #[serde(default)]
    pub db_config: DbConfig,
    #[serde(default)]
    pub ftp_config: FtpConfig,
    #[serde(default)]
    pub file_config: FileConfig,
    #[serde(default)]
    pub api_config: ApiConfig,
    #[serde(default)]
    pub mongo_config: MongoConfig,
    #[serde(default)]
    pub redis_config: RedisConfig,
}

/// The decoded, tagged form the agent actually executes against.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Database { db: DbConfig, query: String },
    Mongo { mongo: MongoConfig, filter: String },
    Redis(RedisConfig),
    Ftp { ftp: FtpConfig, file: FileConfig },
    Sftp { ftp: FtpConfig, file: FileConfig },
    Api(ApiConfig),
}

impl SourceConfig {
    /// Collapse the parallel bundles into the variant named by
    /// `source_type`. Unknown types fall back to `database`, matching
    /// the historical dispatch behavior.
    pub fn from_run_job(data: &RunJobData) -> Self {
        match data.source_type.as_str() {
            "mongodb" => Self::Mongo {
                mongo: data.mongo_config.clone(),
                filter: data.query.clone(),
            },
            "redis" => {
                let mut redis = data.redis_config.clone();
                if redis.pattern.is_empty() {
                    redis.pattern = if data.query.is_empty() {
                        "*".into()
                    } else {
                        data.query.clone()
                    };
                }
                Self::Redis(redis)
            }
            "ftp" => Self::Ftp {
                ftp: data.ftp_config.clone(),
                file: data.file_config.clone(),
            },
            "sftp" => Self::Sftp {
                ftp: data.ftp_config.clone(),
                file: data.file_config.clone(),
            },
            "api" => Self::Api(data.api_config.clone()),
            _ => Self::Database {
                db: data.db_config.clone(),
                query: data.query.clone(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database { .. } => "database",
            Self::Mongo { .. } => "mongodb",
            Self::Redis(_) => "redis",
            Self::Ftp { .. } => "ftp",
            Self::Sftp { .. } => "sftp",
            Self::Api(_) => "api",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_selects_exactly_one_bundle() {
        let mut data = RunJobData {
            source_type: "redis".into(),
            query: "user:*".into(),
            ..Default::default()
        };
        data.redis_config.host = "cache.internal".into();
        data.db_config.host = "ignored".into();

        match SourceConfig::from_run_job(&data) {
            SourceConfig::Redis(redis) => {
                assert_eq!(redis.host, "cache.internal");
                assert_eq!(redis.pattern, "user:*");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_source_type_defaults_to_database() {
        let data = RunJobData {
            source_type: "carrier-pigeon".into(),
            query: "SELECT 1".into(),
            ..Default::default()
        };
        assert_eq!(SourceConfig::from_run_job(&data).kind(), "database");
    }

    #[test]
    fn sftp_shares_the_ftp_bundle() {
        let mut data = RunJobData {
            source_type: "sftp".into(),
            ..Default::default()
        };
        data.ftp_config.host = "files.example.com".into();
        data.file_config.format = "xlsx".into();

        match SourceConfig::from_run_job(&data) {
            SourceConfig::Sftp { ftp, file } => {
                assert_eq!(ftp.host, "files.example.com");
                assert_eq!(file.format, "xlsx");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }
}
