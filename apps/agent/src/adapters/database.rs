//! SQL source adapter: Postgres, MySQL, SQL Server, and Oracle.
//!
//! Rows stream through a cursor and accumulate into fixed-size batches;
//! binary columns are coerced to strings so every record is plain JSON.

use bigdecimal::ToPrimitive;
use futures_util::TryStreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::info;

use datalink_wire::{DbConfig, Record, BATCH_SIZE};

use crate::error::{AgentError, AgentResult};

use super::BatchEmitter;

pub async fn run(db: &DbConfig, query: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    if query.trim().is_empty() {
        return Err(AgentError::Source("empty query".into()));
    }
    if db.host.is_empty() {
        return Err(AgentError::Source("database host is not configured".into()));
    }

    match db.driver.as_str() {
        "postgres" | "postgresql" | "" => run_postgres(db, query, emitter).await,
        "mysql" | "mariadb" => run_mysql(db, query, emitter).await,
        "sqlserver" | "mssql" => run_sqlserver(db, query, emitter).await,
        "oracle" => run_oracle(db, query, emitter).await,
        other => Err(AgentError::Source(format!("unsupported driver: {}", other))),
    }
}

async fn flush(batch: &mut Vec<Record>, emitter: &BatchEmitter) -> AgentResult<()> {
    if !batch.is_empty() {
        emitter.emit(std::mem::take(batch)).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

async fn run_postgres(db: &DbConfig, query: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

    let ssl_mode = match db.sslmode.as_str() {
        "require" => PgSslMode::Require,
        "verify-full" => PgSslMode::VerifyFull,
        "prefer" => PgSslMode::Prefer,
        _ => PgSslMode::Disable,
    };
    let options = PgConnectOptions::new()
        .host(&db.host)
        .port(db.port.parse().unwrap_or(5432))
        .username(&db.user)
        .password(&db.password)
        .database(&db.db_name)
        .ssl_mode(ssl_mode);

    let pool = PgPoolOptions::new().max_connections(2).connect_with(options).await?;

    let mut total = 0usize;
    let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);
    let mut rows = sqlx::query(query).fetch(&pool);

    while let Some(row) = rows.try_next().await? {
        batch.push(pg_row_to_record(&row));
        total += 1;
        if batch.len() >= BATCH_SIZE {
            flush(&mut batch, emitter).await?;
        }
    }
    flush(&mut batch, emitter).await?;

    info!(total, "postgres extraction finished");
    Ok(())
}

fn pg_row_to_record(row: &sqlx::postgres::PgRow) -> Record {
    use sqlx::{Column, Row, TypeInfo};

    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::from),
            "INT2" => row.try_get::<Option<i16>, _>(i).ok().flatten().map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i).ok().flatten().map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i).ok().flatten().map(Value::from),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
            "NUMERIC" => row
                .try_get::<Option<bigdecimal::BigDecimal>, _>(i)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64())
                .map(Value::from),
            "BYTEA" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .ok()
                .flatten()
                .map(|b| json!(String::from_utf8_lossy(&b).into_owned())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(i)
                .ok()
                .flatten(),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
        };

        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    record
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

async fn run_mysql(db: &DbConfig, query: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

    let options = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.port.parse().unwrap_or(3306))
        .username(&db.user)
        .password(&db.password)
        .database(&db.db_name);

    let pool = MySqlPoolOptions::new().max_connections(2).connect_with(options).await?;

    let mut total = 0usize;
    let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);
    let mut rows = sqlx::query(query).fetch(&pool);

    while let Some(row) = rows.try_next().await? {
        batch.push(mysql_row_to_record(&row));
        total += 1;
        if batch.len() >= BATCH_SIZE {
            flush(&mut batch, emitter).await?;
        }
    }
    flush(&mut batch, emitter).await?;

    info!(total, "mysql extraction finished");
    Ok(())
}

fn mysql_row_to_record(row: &sqlx::mysql::MySqlRow) -> Record {
    use sqlx::{Column, Row, TypeInfo};

    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOLEAN" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::from),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row
                .try_get::<Option<u64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "FLOAT" => row.try_get::<Option<f32>, _>(i).ok().flatten().map(Value::from),
            "DOUBLE" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
            "DECIMAL" => row
                .try_get::<Option<bigdecimal::BigDecimal>, _>(i)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64())
                .map(Value::from),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(i)
                .ok()
                .flatten()
                .map(|t| json!(t.to_string())),
            "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" | "BINARY" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .ok()
                .flatten()
                .map(|b| json!(String::from_utf8_lossy(&b).into_owned())),
            "JSON" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
        };

        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    record
}

// ---------------------------------------------------------------------------
// SQL Server
// ---------------------------------------------------------------------------

async fn run_sqlserver(db: &DbConfig, query: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    use tiberius::{AuthMethod, Client, Config, QueryItem};

    let mut config = Config::new();
    config.host(&db.host);
    config.port(db.port.parse().unwrap_or(1433));
    config.authentication(AuthMethod::sql_server(&db.user, &db.password));
    if !db.db_name.is_empty() {
        config.database(&db.db_name);
    }
    config.trust_cert();

    let tcp = tokio::net::TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| AgentError::Source(format!("sqlserver connect failed: {}", e)))?;
    tcp.set_nodelay(true)
        .map_err(|e| AgentError::Source(e.to_string()))?;

    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| AgentError::Source(format!("sqlserver handshake failed: {}", e)))?;

    let mut stream = client
        .simple_query(query)
        .await
        .map_err(|e| AgentError::Source(format!("sqlserver query failed: {}", e)))?;

    let mut total = 0usize;
    let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);

    while let Some(item) = stream
        .try_next()
        .await
        .map_err(|e| AgentError::Source(e.to_string()))?
    {
        if let QueryItem::Row(row) = item {
            batch.push(mssql_row_to_record(row));
            total += 1;
            if batch.len() >= BATCH_SIZE {
                flush(&mut batch, emitter).await?;
            }
        }
    }
    flush(&mut batch, emitter).await?;

    info!(total, "sqlserver extraction finished");
    Ok(())
}

fn mssql_row_to_record(row: tiberius::Row) -> Record {
    use tiberius::ColumnData;

    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();

    let mut record = Record::new();
    for (name, data) in names.into_iter().zip(row.into_iter()) {
        let value = match data {
            ColumnData::Bit(v) => v.map(Value::from),
            ColumnData::U8(v) => v.map(|x| json!(x as i64)),
            ColumnData::I16(v) => v.map(|x| json!(x as i64)),
            ColumnData::I32(v) => v.map(|x| json!(x as i64)),
            ColumnData::I64(v) => v.map(Value::from),
            ColumnData::F32(v) => v.map(|x| json!(x as f64)),
            ColumnData::F64(v) => v.map(Value::from),
            ColumnData::Numeric(v) => {
                v.map(|n| json!(n.value() as f64 / 10f64.powi(n.scale() as i32)))
            }
            ColumnData::String(v) => v.map(|s| json!(s.into_owned())),
            ColumnData::Guid(v) => v.map(|g| json!(g.to_string())),
            ColumnData::Binary(v) => {
                v.map(|b| json!(String::from_utf8_lossy(b.as_ref()).into_owned()))
            }
            // temporal variants carry raw wire encodings; stringify
            other => from_sql_to_string(other),
        };
        record.insert(name, value.unwrap_or(Value::Null));
    }
    record
}

fn from_sql_to_string(data: tiberius::ColumnData<'static>) -> Option<Value> {
    use tiberius::FromSql;

    if let Ok(Some(t)) = chrono::NaiveDateTime::from_sql(&data) {
        return Some(json!(t.to_string()));
    }
    if let Ok(Some(t)) = chrono::NaiveDate::from_sql(&data) {
        return Some(json!(t.to_string()));
    }
    if let Ok(Some(t)) = chrono::NaiveTime::from_sql(&data) {
        return Some(json!(t.to_string()));
    }
    if let Ok(Some(t)) = chrono::DateTime::<chrono::Utc>::from_sql(&data) {
        return Some(json!(t.to_rfc3339()));
    }
    None
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// The oracle driver is blocking; the query runs on a blocking thread
/// that hands finished batches back over a channel.
async fn run_oracle(db: &DbConfig, query: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    let (tx, mut rx) = mpsc::channel::<Vec<Record>>(4);

    let db = db.clone();
    let query = query.to_string();
    let worker = tokio::task::spawn_blocking(move || -> Result<usize, String> {
        let connect_string = format!("//{}:{}/{}", db.host, db.port, db.db_name);
        let conn = oracle::Connection::connect(&db.user, &db.password, &connect_string)
            .map_err(|e| format!("oracle connect failed: {}", e))?;

        let rows = conn
            .query(&query, &[])
            .map_err(|e| format!("oracle query failed: {}", e))?;
        let column_names: Vec<String> = rows
            .column_info()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut total = 0usize;
        let mut batch: Vec<Record> = Vec::with_capacity(BATCH_SIZE);
        for row in rows {
            let row = row.map_err(|e| e.to_string())?;
            batch.push(oracle_row_to_record(&row, &column_names));
            total += 1;
            if batch.len() >= BATCH_SIZE
                && tx.blocking_send(std::mem::take(&mut batch)).is_err()
            {
                return Err("session closed".into());
            }
        }
        if !batch.is_empty() && tx.blocking_send(batch).is_err() {
            return Err("session closed".into());
        }
        Ok(total)
    });

    while let Some(batch) = rx.recv().await {
        emitter.emit(batch).await?;
    }

    let total = worker
        .await
        .map_err(|e| AgentError::Source(e.to_string()))?
        .map_err(AgentError::Source)?;

    info!(total, "oracle extraction finished");
    Ok(())
}

fn oracle_row_to_record(row: &oracle::Row, column_names: &[String]) -> Record {
    let mut record = Record::new();
    for (i, name) in column_names.iter().enumerate() {
        let value = match row.get::<usize, Option<i64>>(i) {
            Ok(Some(v)) => json!(v),
            Ok(None) => Value::Null,
            Err(_) => match row.get::<usize, Option<f64>>(i) {
                Ok(Some(v)) => json!(v),
                Ok(None) => Value::Null,
                // the driver converts dates, CLOBs, and RAW to strings
                Err(_) => match row.get::<usize, Option<String>>(i) {
                    Ok(Some(v)) => json!(v),
                    _ => Value::Null,
                },
            },
        };
        record.insert(name.clone(), value);
    }
    record
}
