//! Database queries for job logs.
//!
//! A log is inserted at dispatch, updated on every streamed batch, and
//! finalized on the terminal frame - or by the reaper when the agent
//! vanished mid-stream.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

use crate::entity::job_log::{self, ActiveModel, Entity as JobLog};
use crate::error::{AppError, AppResult};
use crate::models::LogStatus;

use super::DbPool;

impl DbPool {
    /// Insert a fresh running log for a dispatch.
    pub async fn insert_running_log(&self, job_id: i64) -> AppResult<job_log::Model> {
        let now = Utc::now();

        let model = ActiveModel {
            job_id: Set(job_id),
            status: Set(LogStatus::Running.as_str().to_string()),
            started_at: Set(now),
            completed_at: Set(None),
            duration_ms: Set(None),
            record_count: Set(0),
            error_message: Set(None),
            sample_data: Set(None),
            created_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert job log: {}", e)))?;

        Ok(result)
    }

    /// Get a log by ID.
    pub async fn get_job_log(&self, id: i64) -> AppResult<Option<job_log::Model>> {
        let result = JobLog::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get job log: {}", e)))?;

        Ok(result)
    }

    /// Recent logs for one job.
    pub async fn list_job_logs(&self, job_id: i64, limit: u64) -> AppResult<Vec<job_log::Model>> {
        let result = JobLog::find()
            .filter(job_log::Column::JobId.eq(job_id))
            .order_by_desc(job_log::Column::CreatedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list job logs: {}", e)))?;

        Ok(result)
    }

    /// Most recent logs across all jobs (operator notifications).
    pub async fn recent_job_logs(&self, limit: u64) -> AppResult<Vec<job_log::Model>> {
        let result = JobLog::find()
            .order_by_desc(job_log::Column::CreatedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list recent logs: {}", e)))?;

        Ok(result)
    }

    /// Apply one streamed batch: accumulate the count, keep the first
    /// non-empty sample, and record any error text.
    pub async fn apply_log_batch(
        &self,
        id: i64,
        record_count: i64,
        sample: Option<String>,
        error: Option<String>,
    ) -> AppResult<()> {
        let existing = self
            .get_job_log(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("JobLog {}", id)))?;

        let total = existing.record_count + record_count;
        let keep_sample = existing.sample_data.is_none();
        let mut active: ActiveModel = existing.into();
        active.record_count = Set(total);
        if keep_sample {
            if let Some(sample) = sample {
                active.sample_data = Set(Some(sample));
            }
        }
        if let Some(error) = error {
            active.error_message = Set(Some(error));
        }

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to apply log batch: {}", e)))?;

        Ok(())
    }

    /// Finalize a log on the terminal frame.
    pub async fn finalize_log(&self, id: i64, status: LogStatus) -> AppResult<()> {
        let existing = self
            .get_job_log(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("JobLog {}", id)))?;

        let now = Utc::now();
        let duration = (now - existing.started_at).num_milliseconds();
        let mut active: ActiveModel = existing.into();
        active.status = Set(status.as_str().to_string());
        active.completed_at = Set(Some(now));
        active.duration_ms = Set(Some(duration));

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to finalize log: {}", e)))?;

        Ok(())
    }

    /// Fail a log outright (dispatch errors, reaper).
    pub async fn fail_log(&self, id: i64, message: &str) -> AppResult<()> {
        let existing = self
            .get_job_log(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("JobLog {}", id)))?;

        let now = Utc::now();
        let duration = (now - existing.started_at).num_milliseconds();
        let mut active: ActiveModel = existing.into();
        active.status = Set(LogStatus::Failed.as_str().to_string());
        active.completed_at = Set(Some(now));
        active.duration_ms = Set(Some(duration));
        active.error_message = Set(Some(message.to_string()));

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to fail log: {}", e)))?;

        Ok(())
    }

    /// Reaper: flip lingering running logs of a failed job to failed.
    /// Returns how many logs were reaped.
    pub async fn reap_running_logs(
        &self,
        job_id: i64,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> AppResult<usize> {
        let lingering = JobLog::find()
            .filter(job_log::Column::JobId.eq(job_id))
            .filter(job_log::Column::Status.eq(LogStatus::Running.as_str()))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find lingering logs: {}", e)))?;

        let count = lingering.len();
        for log in lingering {
            let duration = (completed_at - log.started_at).num_milliseconds();
            let mut active: ActiveModel = log.into();
            active.status = Set(LogStatus::Failed.as_str().to_string());
            active.error_message = Set(Some(message.to_string()));
            active.completed_at = Set(Some(completed_at));
            active.duration_ms = Set(Some(duration));
            active
                .update(self.connection())
                .await
                .map_err(|e| AppError::Database(format!("Failed to reap log: {}", e)))?;
        }

        Ok(count)
    }
}
