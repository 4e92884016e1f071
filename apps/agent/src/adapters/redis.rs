//! Redis source adapter: SCAN over a key pattern, fetching each value
//! by its type. Record shape: `{key, type, value, ttl}`.

use std::time::Duration;

use redis::AsyncCommands;
use serde_json::{json, Value};
use tracing::info;

use datalink_wire::{Record, RedisConfig};

use crate::error::{AgentError, AgentResult};

use super::BatchEmitter;

/// Overall time limit for one scan.
const SCAN_TIMEOUT: Duration = Duration::from_secs(60);
/// SCAN page size hint.
const SCAN_COUNT: usize = 1000;

pub async fn run(config: &RedisConfig, emitter: &BatchEmitter) -> AgentResult<()> {
    if config.host.is_empty() {
        return Err(AgentError::Source(
            "redis config missing required field: host".into(),
        ));
    }

    let mut conn = connect(config).await?;
    let pattern = if config.pattern.is_empty() {
        "*"
    } else {
        &config.pattern
    };

    info!(pattern = %pattern, db = config.db, "scanning redis keys");

    let records = tokio::time::timeout(SCAN_TIMEOUT, scan_keys(&mut conn, pattern))
        .await
        .map_err(|_| AgentError::Source("redis scan timed out".into()))??;

    info!(total = records.len(), "redis extraction finished");
    emitter.emit(records).await
}

pub async fn connect(config: &RedisConfig) -> AgentResult<redis::aio::MultiplexedConnection> {
    let port = if config.port.is_empty() {
        "6379"
    } else {
        &config.port
    };
    let url = if config.password.is_empty() {
        format!("redis://{}:{}/{}", config.host, port, config.db)
    } else {
        format!("redis://:{}@{}:{}/{}", config.password, config.host, port, config.db)
    };

    let client =
        redis::Client::open(url).map_err(|e| AgentError::Source(format!("redis config: {}", e)))?;

    let conn = tokio::time::timeout(
        Duration::from_secs(5),
        client.get_multiplexed_async_connection(),
    )
    .await
    .map_err(|_| AgentError::Source("redis dial timed out".into()))?
    .map_err(|e| AgentError::Source(format!("failed to connect redis: {}", e)))?;

    Ok(conn)
}

async fn scan_keys(
    conn: &mut redis::aio::MultiplexedConnection,
    pattern: &str,
) -> AgentResult<Vec<Record>> {
    let mut records = Vec::new();
    let mut cursor: u64 = 0;

    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await
            .map_err(|e| AgentError::Source(format!("redis scan failed: {}", e)))?;

        for key in keys {
            let Ok(key_type): Result<String, _> = redis::cmd("TYPE")
                .arg(&key)
                .query_async(conn)
                .await
            else {
                continue;
            };

            let value = fetch_value(conn, &key, &key_type).await;
            let ttl: i64 = conn.ttl(&key).await.unwrap_or(-1);

            let mut record = Record::new();
            record.insert("key".into(), json!(key));
            record.insert("type".into(), json!(key_type));
            record.insert("value".into(), value.unwrap_or(Value::Null));
            record.insert("ttl".into(), json!(ttl));
            records.push(record);
        }

        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    Ok(records)
}

async fn fetch_value(
    conn: &mut redis::aio::MultiplexedConnection,
    key: &str,
    key_type: &str,
) -> Option<Value> {
    match key_type {
        "string" => conn.get::<_, String>(key).await.ok().map(Value::from),
        "hash" => conn
            .hgetall::<_, std::collections::HashMap<String, String>>(key)
            .await
            .ok()
            .map(|m| json!(m)),
        "list" => conn
            .lrange::<_, Vec<String>>(key, 0, -1)
            .await
            .ok()
            .map(|v| json!(v)),
        "set" => conn
            .smembers::<_, Vec<String>>(key)
            .await
            .ok()
            .map(|v| json!(v)),
        "zset" => conn
            .zrange_withscores::<_, Vec<(String, f64)>>(key, 0, -1)
            .await
            .ok()
            .map(|v| {
                json!(v
                    .into_iter()
                    .map(|(member, score)| json!({ "member": member, "score": score }))
                    .collect::<Vec<_>>())
            }),
        _ => None,
    }
}
