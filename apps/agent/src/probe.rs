//! Connection probes for TEST_CONNECTION commands.
//!
//! Each probe opens a connection of the requested source type, runs a
//! trivial check (version query, directory listing, ping), and reports
//! `{success, duration_ms, error?, version?, host, port}`.

use std::time::Instant;

use serde_json::Value;
use tracing::info;

use datalink_wire::{
    ApiConfig, DbConfig, FtpConfig, MongoConfig, RedisConfig, TestConnectionResultData,
    WireMessage,
};

use crate::adapters;
use crate::error::AgentResult;

/// Dispatch a TEST_CONNECTION request by its `source_type`.
pub async fn test_connection(msg: &WireMessage, default_db: &DbConfig) -> TestConnectionResultData {
    let started = Instant::now();
    let request_id = msg
        .data
        .get("request_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let source_type = msg
        .data
        .get("source_type")
        .and_then(Value::as_str)
        .unwrap_or("database");

    info!(source_type, "testing connection");

    let mut result = TestConnectionResultData {
        request_id,
        ..Default::default()
    };

    let outcome = match source_type {
        "ftp" => probe_ftp(msg, &mut result).await,
        "sftp" => probe_sftp(msg, &mut result).await,
        "mongodb" => probe_mongo(msg, &mut result).await,
        "redis" => probe_redis(msg, &mut result).await,
        "api" => probe_api(msg, &mut result).await,
        _ => probe_database(msg, default_db, &mut result).await,
    };

    result.duration_ms = started.elapsed().as_millis() as i64;
    match outcome {
        Ok(()) => result.success = true,
        Err(e) => {
            result.success = false;
            result.error = Some(e.to_string());
        }
    }
    result
}

fn bundle<T: Default + for<'de> serde::Deserialize<'de>>(msg: &WireMessage, key: &str) -> T {
    msg.data
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

async fn probe_database(
    msg: &WireMessage,
    default_db: &DbConfig,
    result: &mut TestConnectionResultData,
) -> AgentResult<()> {
    let mut db: DbConfig = bundle(msg, "db_config");
    if db.host.is_empty() {
        db = default_db.clone();
    }
    if db.driver.is_empty() {
        db.driver = "postgres".into();
    }
    if db.port.is_empty() {
        db.port = "5432".into();
    }

    result.host = db.host.clone();
    result.port = db.port.clone();

    let version = query_version(&db).await?;
    result.version = Some(version);
    Ok(())
}

/// Open a throwaway connection and ask the server for its version.
async fn query_version(db: &DbConfig) -> AgentResult<String> {
    use crate::error::AgentError;

    match db.driver.as_str() {
        "postgres" | "postgresql" | "" => {
            use sqlx::postgres::PgConnectOptions;
            use sqlx::ConnectOptions;
            let mut conn = PgConnectOptions::new()
                .host(&db.host)
                .port(db.port.parse().unwrap_or(5432))
                .username(&db.user)
                .password(&db.password)
                .database(&db.db_name)
                .connect()
                .await?;
            let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(&mut conn).await?;
            Ok(row.0)
        }
        "mysql" | "mariadb" => {
            use sqlx::mysql::MySqlConnectOptions;
            use sqlx::ConnectOptions;
            let mut conn = MySqlConnectOptions::new()
                .host(&db.host)
                .port(db.port.parse().unwrap_or(3306))
                .username(&db.user)
                .password(&db.password)
                .database(&db.db_name)
                .connect()
                .await?;
            let row: (String,) = sqlx::query_as("SELECT VERSION()").fetch_one(&mut conn).await?;
            Ok(row.0)
        }
        "sqlserver" | "mssql" => {
            use futures_util::TryStreamExt;
            use tokio_util::compat::TokioAsyncWriteCompatExt;

            let mut config = tiberius::Config::new();
            config.host(&db.host);
            config.port(db.port.parse().unwrap_or(1433));
            config.authentication(tiberius::AuthMethod::sql_server(&db.user, &db.password));
            config.trust_cert();

            let tcp = tokio::net::TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| AgentError::Source(e.to_string()))?;
            let mut client = tiberius::Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| AgentError::Source(e.to_string()))?;
            let mut stream = client
                .simple_query("SELECT @@VERSION")
                .await
                .map_err(|e| AgentError::Source(e.to_string()))?;

            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| AgentError::Source(e.to_string()))?
            {
                if let tiberius::QueryItem::Row(row) = item {
                    if let Ok(Some(version)) = row.try_get::<&str, _>(0) {
                        return Ok(version.to_string());
                    }
                }
            }
            Ok(String::new())
        }
        "oracle" => {
            let db = db.clone();
            tokio::task::spawn_blocking(move || -> Result<String, String> {
                let connect_string = format!("//{}:{}/{}", db.host, db.port, db.db_name);
                let conn = oracle::Connection::connect(&db.user, &db.password, &connect_string)
                    .map_err(|e| e.to_string())?;
                conn.query_row_as::<String>("SELECT banner FROM v$version WHERE ROWNUM = 1", &[])
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| AgentError::Source(e.to_string()))?
            .map_err(AgentError::Source)
        }
        other => Err(AgentError::Source(format!("unsupported driver: {}", other))),
    }
}

async fn probe_ftp(msg: &WireMessage, result: &mut TestConnectionResultData) -> AgentResult<()> {
    let ftp: FtpConfig = bundle(msg, "ftp_config");
    result.host = ftp.host.clone();
    result.port = if ftp.port.is_empty() { "21".into() } else { ftp.port.clone() };

    tokio::task::spawn_blocking(move || adapters::ftp::list_dir(&ftp).map(|_| ()))
        .await
        .map_err(|e| crate::error::AgentError::Source(e.to_string()))?
}

async fn probe_sftp(msg: &WireMessage, result: &mut TestConnectionResultData) -> AgentResult<()> {
    let ftp: FtpConfig = bundle(msg, "ftp_config");
    result.host = ftp.host.clone();
    result.port = match ftp.port.as_str() {
        "" | "21" => "22".into(),
        other => other.to_string(),
    };

    tokio::task::spawn_blocking(move || adapters::sftp::list_dir(&ftp).map(|_| ()))
        .await
        .map_err(|e| crate::error::AgentError::Source(e.to_string()))?
}

async fn probe_mongo(msg: &WireMessage, result: &mut TestConnectionResultData) -> AgentResult<()> {
    use mongodb::bson::doc;

    let mongo: MongoConfig = bundle(msg, "mongo_config");
    result.host = mongo.host.clone();
    result.port = if mongo.port.is_empty() { "27017".into() } else { mongo.port.clone() };

    let client = adapters::mongo::connect(&mongo).await?;
    let database = if mongo.database.is_empty() { "admin".to_string() } else { mongo.database };
    client
        .database(&database)
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| crate::error::AgentError::Source(format!("mongodb ping failed: {}", e)))?;
    Ok(())
}

async fn probe_redis(msg: &WireMessage, result: &mut TestConnectionResultData) -> AgentResult<()> {
    let redis_cfg: RedisConfig = bundle(msg, "redis_config");
    result.host = redis_cfg.host.clone();
    result.port = if redis_cfg.port.is_empty() { "6379".into() } else { redis_cfg.port.clone() };

    let mut conn = adapters::redis::connect(&redis_cfg).await?;
    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| crate::error::AgentError::Source(format!("redis ping failed: {}", e)))?;
    if pong != "PONG" {
        return Err(crate::error::AgentError::Source(format!(
            "unexpected PING reply: {}",
            pong
        )));
    }
    Ok(())
}

async fn probe_api(msg: &WireMessage, result: &mut TestConnectionResultData) -> AgentResult<()> {
    let api: ApiConfig = bundle(msg, "api_config");
    result.host = api.url.clone();

    adapters::http::fetch(&api).await.map(|_| ())
}
