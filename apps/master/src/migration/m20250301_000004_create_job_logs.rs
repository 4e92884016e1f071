//! Migration: Create job_logs table.
//!
//! Inserted at dispatch, updated on every streamed batch, finalized on
//! the terminal frame (or by the reaper).

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
                CREATE TABLE job_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    status TEXT NOT NULL DEFAULT 'running'
                        CHECK (status IN ('running', 'completed', 'failed')),
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    duration_ms INTEGER,
                    record_count INTEGER NOT NULL DEFAULT 0,
                    error_message TEXT,
                    -- first <=5 records of the first non-empty batch
                    sample_data TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX idx_job_logs_job_id ON job_logs(job_id);
                CREATE INDEX idx_job_logs_status ON job_logs(status);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS job_logs;")
            .await?;

        Ok(())
    }
}
