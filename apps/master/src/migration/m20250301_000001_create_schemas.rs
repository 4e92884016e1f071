//! Migration: Create schemas table.

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
                CREATE TABLE schemas (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    source_type TEXT NOT NULL DEFAULT 'query'
                        CHECK (source_type IN ('query', 'file')),
                    sql_command TEXT NOT NULL DEFAULT '',
                    target_table TEXT NOT NULL,
                    unique_key_column TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',

                    -- file-parsing hints
                    file_format TEXT NOT NULL DEFAULT 'csv',
                    file_pattern TEXT NOT NULL DEFAULT '',
                    has_header INTEGER NOT NULL DEFAULT 1,
                    delimiter TEXT NOT NULL DEFAULT ',',

                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS schemas;")
            .await?;

        Ok(())
    }
}
