//! Migration: Create networks table.
//!
//! One row per source endpoint. The per-adapter blocks are flat columns;
//! only the block matching source_type is honored at dispatch.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE networks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    agent_name TEXT NOT NULL DEFAULT '',
                    ip_address TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'offline'
                        CHECK (status IN ('online', 'offline')),
                    last_seen TEXT,
                    source_type TEXT NOT NULL DEFAULT 'database'
                        CHECK (source_type IN ('database', 'ftp', 'sftp', 'api', 'mongodb', 'redis')),

                    db_driver TEXT NOT NULL DEFAULT '',
                    db_host TEXT NOT NULL DEFAULT '',
                    db_port TEXT NOT NULL DEFAULT '',
                    db_user TEXT NOT NULL DEFAULT '',
                    db_password TEXT NOT NULL DEFAULT '',
                    db_name TEXT NOT NULL DEFAULT '',
                    db_sslmode TEXT NOT NULL DEFAULT '',

                    ftp_host TEXT NOT NULL DEFAULT '',
                    ftp_port TEXT NOT NULL DEFAULT '',
                    ftp_user TEXT NOT NULL DEFAULT '',
                    ftp_password TEXT NOT NULL DEFAULT '',
                    ftp_private_key TEXT NOT NULL DEFAULT '',
                    ftp_path TEXT NOT NULL DEFAULT '',
                    ftp_passive INTEGER NOT NULL DEFAULT 0,

                    api_url TEXT NOT NULL DEFAULT '',
                    api_method TEXT NOT NULL DEFAULT '',
                    api_headers TEXT NOT NULL DEFAULT '',
                    api_auth_type TEXT NOT NULL DEFAULT '',
                    api_auth_key TEXT NOT NULL DEFAULT '',
                    api_auth_value TEXT NOT NULL DEFAULT '',
                    api_body TEXT NOT NULL DEFAULT '',

                    mongo_host TEXT NOT NULL DEFAULT '',
                    mongo_port TEXT NOT NULL DEFAULT '',
                    mongo_user TEXT NOT NULL DEFAULT '',
                    mongo_password TEXT NOT NULL DEFAULT '',
                    mongo_database TEXT NOT NULL DEFAULT '',
                    mongo_collection TEXT NOT NULL DEFAULT '',
                    mongo_auth_db TEXT NOT NULL DEFAULT '',

                    redis_host TEXT NOT NULL DEFAULT '',
                    redis_port TEXT NOT NULL DEFAULT '',
                    redis_password TEXT NOT NULL DEFAULT '',
                    redis_db INTEGER NOT NULL DEFAULT 0,
                    redis_pattern TEXT NOT NULL DEFAULT '',

                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX idx_networks_status ON networks(status);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS networks;")
            .await?;

        Ok(())
    }
}
