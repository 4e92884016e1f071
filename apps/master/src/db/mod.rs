//! Database module providing connection management, migrations, and
//! queries over the embedded entity store.

pub mod agent_tokens;
pub mod audit_logs;
pub mod job_logs;
pub mod jobs;
pub mod networks;
pub mod schemas;
pub mod settings;
pub mod users;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

use crate::config::StoreSettings;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use sea_orm_migration::MigratorTrait;

/// Entity-store connection wrapper using SeaORM over embedded SQLite.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Open (creating if absent) the embedded store.
    pub async fn new(store: &StoreSettings) -> AppResult<Self> {
        if let Some(parent) = std::path::Path::new(&store.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(format!("Failed to create store dir: {}", e)))?;
            }
        }

        let mut opt = ConnectOptions::new(store.connection_url());
        opt.max_connections(10)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opt)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open entity store: {}", e)))?;

        info!(path = %store.path, "Entity store opened");

        Ok(DbPool { conn })
    }

    /// In-memory store for tests. One pooled connection, because every
    /// in-memory SQLite connection is its own database.
    pub async fn new_in_memory() -> AppResult<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let conn = Database::connect(opt)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(DbPool { conn })
    }

    /// Run pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Entity store migrations complete");
        Ok(())
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}
