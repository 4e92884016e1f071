//! Target sink: dialect-aware create-if-absent and upsert.
//!
//! One pooled connection to Postgres, MySQL, or Oracle, selected at
//! startup and shared by every response handler. Rows are written one
//! statement per record; row-level errors are logged and skipped so a
//! bad row never poisons its batch.

use serde_json::Value;
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, MySqlPool, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use datalink_wire::Record;

use crate::config::{defaults, TargetDbSettings};
use crate::error::{AppError, AppResult};

/// The three supported sink dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mysql,
    Oracle,
}

impl Dialect {
    pub fn parse(driver: &str) -> Option<Self> {
        match driver {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    fn quote(&self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::Oracle => format!("\"{}\"", ident),
            Self::Mysql => format!("`{}`", ident),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::Mysql => "?".to_string(),
            Self::Oracle => format!(":{}", index),
        }
    }

    /// Column type for a sample value. JSON leaves every number a
    /// double, so integer-valued doubles are re-classified as BIGINT.
    fn column_type(&self, value: &Value) -> &'static str {
        match value {
            Value::Number(n) => {
                let integral = n.as_i64().is_some()
                    || n.as_f64().map(|f| f == f.trunc() && f.is_finite()).unwrap_or(false);
                match (self, integral) {
                    (Self::Oracle, true) => "NUMBER(19)",
                    (Self::Oracle, false) => "BINARY_DOUBLE",
                    (_, true) => "BIGINT",
                    (_, false) => "DOUBLE PRECISION",
                }
            }
            Value::Bool(_) => match self {
                Self::Oracle => "NUMBER(1)",
                _ => "BOOLEAN",
            },
            // TEXT is the safe default for nulls and unknown shapes
            _ => match self {
                Self::Oracle => "CLOB",
                _ => "TEXT",
            },
        }
    }
}

/// Identifiers must match `^[A-Za-z_][A-Za-z0-9_]{0,62}$`; anything else
/// is rejected before it can reach a statement.
pub fn validate_identifier(name: &str) -> AppResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::Sink(format!("invalid identifier '{}'", name)))
    }
}

/// CREATE TABLE from a sample record, column types inferred per value.
pub fn build_create_table(dialect: Dialect, table: &str, sample: &Record) -> String {
    let columns: Vec<String> = sample
        .iter()
        .map(|(name, value)| format!("{} {}", dialect.quote(name), dialect.column_type(value)))
        .collect();

    format!(
        "CREATE TABLE {} ({})",
        dialect.quote(table),
        columns.join(", ")
    )
}

/// Dialect-specific upsert for one row's column list. With an empty
/// `unique_key` this degrades to insert-ignore.
pub fn build_upsert(dialect: Dialect, table: &str, columns: &[String], unique_key: &str) -> String {
    let quoted_table = dialect.quote(table);
    let column_list: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();
    let non_key: Vec<&String> = columns.iter().filter(|c| c.as_str() != unique_key).collect();

    match dialect {
        Dialect::Postgres => {
            let base = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted_table,
                column_list.join(", "),
                placeholders.join(", ")
            );
            if unique_key.is_empty() || non_key.is_empty() {
                if unique_key.is_empty() {
                    format!("{} ON CONFLICT DO NOTHING", base)
                } else {
                    format!("{} ON CONFLICT ({}) DO NOTHING", base, dialect.quote(unique_key))
                }
            } else {
                let updates: Vec<String> = non_key
                    .iter()
                    .map(|c| format!("{} = EXCLUDED.{}", dialect.quote(c), dialect.quote(c)))
                    .collect();
                format!(
                    "{} ON CONFLICT ({}) DO UPDATE SET {}",
                    base,
                    dialect.quote(unique_key),
                    updates.join(", ")
                )
            }
        }
        Dialect::Mysql => {
            if unique_key.is_empty() || non_key.is_empty() {
                format!(
                    "INSERT IGNORE INTO {} ({}) VALUES ({})",
                    quoted_table,
                    column_list.join(", "),
                    placeholders.join(", ")
                )
            } else {
                let updates: Vec<String> = non_key
                    .iter()
                    .map(|c| format!("{} = VALUES({})", dialect.quote(c), dialect.quote(c)))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
                    quoted_table,
                    column_list.join(", "),
                    placeholders.join(", "),
                    updates.join(", ")
                )
            }
        }
        Dialect::Oracle => {
            if unique_key.is_empty() {
                // no key to merge on; unique violations surface as
                // row errors and are skipped
                return format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quoted_table,
                    column_list.join(", "),
                    placeholders.join(", ")
                );
            }
            let src_columns: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} AS {}", dialect.placeholder(i + 1), dialect.quote(c)))
                .collect();
            let insert_values: Vec<String> = columns
                .iter()
                .map(|c| format!("src.{}", dialect.quote(c)))
                .collect();
            let matched = if non_key.is_empty() {
                String::new()
            } else {
                let updates: Vec<String> = non_key
                    .iter()
                    .map(|c| {
                        format!(
                            "{}.{} = src.{}",
                            quoted_table,
                            dialect.quote(c),
                            dialect.quote(c)
                        )
                    })
                    .collect();
                format!(" WHEN MATCHED THEN UPDATE SET {}", updates.join(", "))
            };
            format!(
                "MERGE INTO {} USING (SELECT {} FROM DUAL) src ON ({}.{} = src.{}){} WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
                quoted_table,
                src_columns.join(", "),
                quoted_table,
                dialect.quote(unique_key),
                dialect.quote(unique_key),
                matched,
                column_list.join(", "),
                insert_values.join(", ")
            )
        }
    }
}

enum SinkBackend {
    Disabled,
    Postgres(PgPool),
    Mysql(MySqlPool),
    Oracle(r2d2::Pool<r2d2_oracle::OracleConnectionManager>),
}

/// The shared sink. Constructed once at startup; `Disabled` when no
/// target database is configured, in which case batches are skipped
/// with a warning.
pub struct TargetSink {
    backend: SinkBackend,
    dialect: Option<Dialect>,
}

impl TargetSink {
    pub fn disabled() -> Self {
        Self {
            backend: SinkBackend::Disabled,
            dialect: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, SinkBackend::Disabled)
    }

    /// Open the pool for the configured driver: 25 open / 10 idle / 1h
    /// lifetime.
    pub async fn connect(settings: &TargetDbSettings) -> AppResult<Self> {
        if !settings.is_configured() {
            warn!("target database not configured, sink disabled");
            return Ok(Self::disabled());
        }

        let dialect = Dialect::parse(&settings.driver).ok_or_else(|| {
            AppError::Sink(format!("unsupported target driver '{}'", settings.driver))
        })?;

        let backend = match dialect {
            Dialect::Postgres => {
                let url = format!(
                    "postgres://{}:{}@{}:{}/{}?sslmode={}",
                    settings.user,
                    settings.password,
                    settings.host,
                    settings.port,
                    settings.db_name,
                    if settings.sslmode.is_empty() {
                        defaults::TARGET_DB_SSLMODE
                    } else {
                        &settings.sslmode
                    }
                );
                let pool = PgPoolOptions::new()
                    .max_connections(defaults::SINK_MAX_CONNECTIONS)
                    .min_connections(defaults::SINK_MIN_CONNECTIONS)
                    .max_lifetime(Duration::from_secs(defaults::SINK_MAX_LIFETIME_SECS))
                    .connect(&url)
                    .await
                    .map_err(|e| AppError::Sink(format!("failed to connect target: {}", e)))?;
                SinkBackend::Postgres(pool)
            }
            Dialect::Mysql => {
                let url = format!(
                    "mysql://{}:{}@{}:{}/{}",
                    settings.user, settings.password, settings.host, settings.port, settings.db_name
                );
                let pool = MySqlPoolOptions::new()
                    .max_connections(defaults::SINK_MAX_CONNECTIONS)
                    .min_connections(defaults::SINK_MIN_CONNECTIONS)
                    .max_lifetime(Duration::from_secs(defaults::SINK_MAX_LIFETIME_SECS))
                    .connect(&url)
                    .await
                    .map_err(|e| AppError::Sink(format!("failed to connect target: {}", e)))?;
                SinkBackend::Mysql(pool)
            }
            Dialect::Oracle => {
                let connect_string =
                    format!("//{}:{}/{}", settings.host, settings.port, settings.db_name);
                let manager = r2d2_oracle::OracleConnectionManager::new(
                    &settings.user,
                    &settings.password,
                    &connect_string,
                );
                let pool = tokio::task::spawn_blocking(move || {
                    r2d2::Pool::builder()
                        .max_size(defaults::SINK_MAX_CONNECTIONS)
                        .min_idle(Some(defaults::SINK_MIN_CONNECTIONS))
                        .max_lifetime(Some(Duration::from_secs(defaults::SINK_MAX_LIFETIME_SECS)))
                        .build(manager)
                })
                .await
                .map_err(|e| AppError::Sink(e.to_string()))?
                .map_err(|e| AppError::Sink(format!("failed to connect target: {}", e)))?;
                SinkBackend::Oracle(pool)
            }
        };

        info!(driver = %settings.driver, host = %settings.host, db = %settings.db_name, "target sink connected");

        Ok(Self {
            backend,
            dialect: Some(dialect),
        })
    }

    /// Write one batch: create the table from the first record when
    /// absent, then upsert (or insert-ignore) row by row. Returns the
    /// summed affected count.
    pub async fn write_batch(
        &self,
        table: &str,
        unique_key: &str,
        records: &[Record],
    ) -> AppResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        validate_identifier(table)?;
        for column in records[0].keys() {
            validate_identifier(column)?;
        }
        if !unique_key.is_empty() {
            validate_identifier(unique_key)?;
        }

        let Some(dialect) = self.dialect else {
            warn!("target database not configured, skipping {} records", records.len());
            return Ok(0);
        };

        self.ensure_table(dialect, table, &records[0]).await?;

        // column order comes from the first record; the batch shares it
        let columns: Vec<String> = records[0].keys().cloned().collect();
        let sql = build_upsert(dialect, table, &columns, unique_key);

        let mut affected = 0u64;
        for record in records {
            let values: Vec<Value> = columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                .collect();

            match self.execute(&sql, values).await {
                Ok(count) => affected += count,
                Err(e) => {
                    warn!(table = %table, error = %e, "row write failed, skipping");
                }
            }
        }

        Ok(affected)
    }

    /// Create the target table when it does not exist yet.
    async fn ensure_table(&self, dialect: Dialect, table: &str, sample: &Record) -> AppResult<()> {
        let exists = match &self.backend {
            SinkBackend::Disabled => return Ok(()),
            SinkBackend::Postgres(pool) => {
                let row: (bool,) = sqlx::query_as(
                    "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
                )
                .bind(table)
                .fetch_one(pool)
                .await
                .map_err(|e| AppError::Sink(format!("table existence check failed: {}", e)))?;
                row.0
            }
            SinkBackend::Mysql(pool) => {
                let row: (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
                )
                .bind(table)
                .fetch_one(pool)
                .await
                .map_err(|e| AppError::Sink(format!("table existence check failed: {}", e)))?;
                row.0 > 0
            }
            SinkBackend::Oracle(pool) => {
                let pool = pool.clone();
                let table = table.to_string();
                tokio::task::spawn_blocking(move || -> Result<bool, String> {
                    let conn = pool.get().map_err(|e| e.to_string())?;
                    let count = conn
                        .query_row_as::<i64>(
                            "SELECT COUNT(*) FROM user_tables WHERE table_name = UPPER(:1)",
                            &[&table],
                        )
                        .map_err(|e| e.to_string())?;
                    Ok(count > 0)
                })
                .await
                .map_err(|e| AppError::Sink(e.to_string()))?
                .map_err(AppError::Sink)?
            }
        };

        if exists {
            return Ok(());
        }

        let create_sql = build_create_table(dialect, table, sample);
        info!(table = %table, "creating target table");
        self.execute(&create_sql, Vec::new()).await?;
        Ok(())
    }

    /// Execute one statement with positional JSON values.
    async fn execute(&self, sql: &str, values: Vec<Value>) -> AppResult<u64> {
        match &self.backend {
            SinkBackend::Disabled => Ok(0),
            SinkBackend::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for value in &values {
                    query = bind_pg(query, value);
                }
                let result = query
                    .execute(pool)
                    .await
                    .map_err(|e| AppError::Sink(e.to_string()))?;
                Ok(result.rows_affected())
            }
            SinkBackend::Mysql(pool) => {
                let mut query = sqlx::query(sql);
                for value in &values {
                    query = bind_mysql(query, value);
                }
                let result = query
                    .execute(pool)
                    .await
                    .map_err(|e| AppError::Sink(e.to_string()))?;
                Ok(result.rows_affected())
            }
            SinkBackend::Oracle(pool) => {
                let pool = pool.clone();
                let sql = sql.to_string();
                tokio::task::spawn_blocking(move || -> Result<u64, String> {
                    let conn = pool.get().map_err(|e| e.to_string())?;
                    let params: Vec<Box<dyn oracle::sql_type::ToSql>> = values
                        .iter()
                        .map(|v| -> Box<dyn oracle::sql_type::ToSql> {
                            match v {
                                Value::Null => Box::new(None::<String>),
                                Value::Bool(b) => Box::new(if *b { 1i64 } else { 0i64 }),
                                Value::Number(n) => match n.as_i64() {
                                    Some(i) => Box::new(i),
                                    None => Box::new(n.as_f64().unwrap_or(0.0)),
                                },
                                Value::String(s) => Box::new(s.clone()),
                                other => Box::new(other.to_string()),
                            }
                        })
                        .collect();
                    let param_refs: Vec<&dyn oracle::sql_type::ToSql> =
                        params.iter().map(|p| p.as_ref()).collect();
                    let stmt = conn.execute(&sql, &param_refs).map_err(|e| e.to_string())?;
                    let count = stmt.row_count().map_err(|e| e.to_string())?;
                    conn.commit().map_err(|e| e.to_string())?;
                    Ok(count)
                })
                .await
                .map_err(|e| AppError::Sink(e.to_string()))?
                .map_err(AppError::Sink)
            }
        }
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_pg<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

type MysqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_mysql<'q>(query: MysqlQuery<'q>, value: &Value) -> MysqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut m = Record::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    #[test]
    fn identifier_rule_rejects_injection() {
        validate_identifier("users_copy").unwrap();
        validate_identifier("_tmp_2024").unwrap();

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1users").is_err());
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("users\"").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
        validate_identifier(&"a".repeat(63)).unwrap();
    }

    #[test]
    fn create_table_infers_types_from_sample() {
        let sample = record(&[
            ("count", json!(42.0)),
            ("ratio", json!(0.5)),
            ("active", json!(true)),
            ("name", json!("a")),
            ("blob", Value::Null),
        ]);

        let sql = build_create_table(Dialect::Postgres, "users_copy", &sample);
        assert!(sql.starts_with("CREATE TABLE \"users_copy\" ("));
        assert!(sql.contains("\"count\" BIGINT"));
        assert!(sql.contains("\"ratio\" DOUBLE PRECISION"));
        assert!(sql.contains("\"active\" BOOLEAN"));
        assert!(sql.contains("\"name\" TEXT"));
        assert!(sql.contains("\"blob\" TEXT"));

        let sql = build_create_table(Dialect::Oracle, "users_copy", &sample);
        assert!(sql.contains("\"count\" NUMBER(19)"));
        assert!(sql.contains("\"ratio\" BINARY_DOUBLE"));
    }

    #[test]
    fn postgres_upsert_uses_excluded() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let sql = build_upsert(Dialect::Postgres, "users_copy", &columns, "id");
        assert_eq!(
            sql,
            "INSERT INTO \"users_copy\" (\"id\", \"name\") VALUES ($1, $2) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );
    }

    #[test]
    fn postgres_without_key_is_do_nothing() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let sql = build_upsert(Dialect::Postgres, "users_copy", &columns, "");
        assert_eq!(
            sql,
            "INSERT INTO \"users_copy\" (\"id\", \"name\") VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn mysql_upsert_uses_values_and_backticks() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let sql = build_upsert(Dialect::Mysql, "users_copy", &columns, "id");
        assert_eq!(
            sql,
            "INSERT INTO `users_copy` (`id`, `name`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );

        let sql = build_upsert(Dialect::Mysql, "users_copy", &columns, "");
        assert!(sql.starts_with("INSERT IGNORE INTO `users_copy`"));
    }

    #[test]
    fn oracle_upsert_is_a_merge_from_dual() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let sql = build_upsert(Dialect::Oracle, "users_copy", &columns, "id");
        assert_eq!(
            sql,
            "MERGE INTO \"users_copy\" USING (SELECT :1 AS \"id\", :2 AS \"name\" FROM DUAL) src \
             ON (\"users_copy\".\"id\" = src.\"id\") \
             WHEN MATCHED THEN UPDATE SET \"users_copy\".\"name\" = src.\"name\" \
             WHEN NOT MATCHED THEN INSERT (\"id\", \"name\") VALUES (src.\"id\", src.\"name\")"
        );
    }

    #[test]
    fn key_only_tables_never_generate_empty_update_sets() {
        let columns = vec!["id".to_string()];
        let sql = build_upsert(Dialect::Postgres, "t", &columns, "id");
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));

        let sql = build_upsert(Dialect::Oracle, "t", &columns, "id");
        assert!(!sql.contains("WHEN MATCHED"));
        assert!(sql.contains("WHEN NOT MATCHED THEN INSERT"));
    }

    #[tokio::test]
    async fn disabled_sink_skips_batches() {
        let sink = TargetSink::disabled();
        let batch = vec![record(&[("id", json!(1))])];
        assert_eq!(sink.write_batch("t", "id", &batch).await.unwrap(), 0);
        assert!(!sink.is_enabled());
    }

    #[tokio::test]
    async fn bad_identifiers_are_rejected_before_any_statement() {
        let sink = TargetSink::disabled();
        let batch = vec![record(&[("id", json!(1))])];
        assert!(sink
            .write_batch("users; DROP TABLE x", "", &batch)
            .await
            .is_err());

        let batch = vec![record(&[("id\"", json!(1))])];
        assert!(sink.write_batch("users_copy", "", &batch).await.is_err());
    }
}
