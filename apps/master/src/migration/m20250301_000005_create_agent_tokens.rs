//! Migration: Create agent_tokens table.

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
                CREATE TABLE agent_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    agent_name TEXT NOT NULL UNIQUE,
                    -- SHA-256 hex of the raw token; raw value never stored
                    token_hash TEXT NOT NULL,
                    -- first 8 chars, display only
                    token_prefix TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    expires_at TEXT,
                    revoked INTEGER NOT NULL DEFAULT 0,
                    last_used_at TEXT,
                    created_by TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX idx_agent_tokens_hash ON agent_tokens(token_hash);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS agent_tokens;")
            .await?;

        Ok(())
    }
}
