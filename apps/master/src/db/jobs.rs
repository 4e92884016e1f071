//! Database queries for jobs.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{
    job::{self, ActiveModel, Entity as Job},
    network, schema,
};
use crate::error::{AppError, AppResult};
use crate::models::{CreateJobRequest, JobStatus, UpdateJobRequest};

use super::DbPool;

/// A job joined with the schema and network it binds.
#[derive(Debug, Clone)]
pub struct JobWithRefs {
    pub job: job::Model,
    pub schema: schema::Model,
    pub network: network::Model,
}

impl DbPool {
    /// Insert a new job.
    pub async fn insert_job(&self, req: &CreateJobRequest) -> AppResult<job::Model> {
        let now = Utc::now();

        if self.get_schema_by_id(req.schema_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!(
                "schema_id {} does not exist",
                req.schema_id
            )));
        }
        if self.get_network_by_id(req.network_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!(
                "network_id {} does not exist",
                req.network_id
            )));
        }

        let model = ActiveModel {
            name: Set(req.name.clone()),
            schema_id: Set(req.schema_id),
            network_id: Set(req.network_id),
            status: Set(JobStatus::Pending.as_str().to_string()),
            schedule: Set(if req.schedule.is_empty() {
                "manual".to_string()
            } else {
                req.schedule.clone()
            }),
            enabled: Set(req.enabled),
            last_run: Set(None),
            created_by: Set(req.created_by.clone()),
            updated_by: Set(req.created_by.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert job: {}", e)))?;

        Ok(result)
    }

    /// Get a job by ID.
    pub async fn get_job_by_id(&self, id: i64) -> AppResult<Option<job::Model>> {
        let result = Job::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get job: {}", e)))?;

        Ok(result)
    }

    /// Get a job together with its schema and network.
    pub async fn get_job_with_refs(&self, id: i64) -> AppResult<Option<JobWithRefs>> {
        let Some(job) = self.get_job_by_id(id).await? else {
            return Ok(None);
        };

        let schema = self
            .get_schema_by_id(job.schema_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Schema {}", job.schema_id)))?;
        let network = self
            .get_network_by_id(job.network_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Network {}", job.network_id)))?;

        Ok(Some(JobWithRefs {
            job,
            schema,
            network,
        }))
    }

    /// List all jobs, newest first.
    pub async fn list_jobs(&self) -> AppResult<Vec<job::Model>> {
        let result = Job::find()
            .order_by_desc(job::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list jobs: {}", e)))?;

        Ok(result)
    }

    /// Jobs the scheduler considers on each tick: enabled, with a
    /// non-manual schedule. The running check stays in the scheduler so
    /// the eligibility query and the firing rule read side by side.
    pub async fn list_schedulable_jobs(&self) -> AppResult<Vec<job::Model>> {
        let result = Job::find()
            .filter(job::Column::Enabled.eq(true))
            .filter(job::Column::Schedule.ne("manual"))
            .filter(job::Column::Schedule.ne(""))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list schedulable jobs: {}", e)))?;

        Ok(result)
    }

    /// Update job fields from an operator edit.
    pub async fn update_job(&self, id: i64, req: &UpdateJobRequest) -> AppResult<job::Model> {
        let existing = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = existing.into();
        if let Some(ref name) = req.name {
            active.name = Set(name.clone());
        }
        if let Some(schema_id) = req.schema_id {
            active.schema_id = Set(schema_id);
        }
        if let Some(network_id) = req.network_id {
            active.network_id = Set(network_id);
        }
        if let Some(ref schedule) = req.schedule {
            active.schedule = Set(schedule.clone());
        }
        if let Some(enabled) = req.enabled {
            active.enabled = Set(enabled);
        }
        active.updated_by = Set(req.updated_by.clone());
        active.updated_at = Set(Utc::now());

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update job: {}", e)))?;

        Ok(result)
    }

    /// Flip the enabled flag; returns the new state.
    pub async fn toggle_job(&self, id: i64) -> AppResult<job::Model> {
        let existing = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let enabled = !existing.enabled;
        let mut active: ActiveModel = existing.into();
        active.enabled = Set(enabled);
        active.updated_at = Set(Utc::now());

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to toggle job: {}", e)))?;

        Ok(result)
    }

    /// Update job status only.
    pub async fn set_job_status(&self, id: i64, status: JobStatus) -> AppResult<()> {
        let existing = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = existing.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to set job status: {}", e)))?;

        Ok(())
    }

    /// Mark a job running and stamp last_run at dispatch time.
    pub async fn mark_job_running(&self, id: i64, fired_at: DateTime<Utc>) -> AppResult<()> {
        let existing = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = existing.into();
        active.status = Set(JobStatus::Running.as_str().to_string());
        active.last_run = Set(Some(fired_at));
        active.updated_at = Set(fired_at);
        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark job running: {}", e)))?;

        Ok(())
    }

    /// Rewrite a job's schedule (legacy-preset migration).
    pub async fn rewrite_job_schedule(&self, id: i64, schedule: &str) -> AppResult<()> {
        let existing = self
            .get_job_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut active: ActiveModel = existing.into();
        active.schedule = Set(schedule.to_string());
        active.updated_at = Set(Utc::now());
        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to rewrite schedule: {}", e)))?;

        Ok(())
    }

    /// Delete a job (cascades to its logs).
    pub async fn delete_job(&self, id: i64) -> AppResult<bool> {
        let result = Job::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete job: {}", e)))?;

        Ok(result.rows_affected > 0)
    }
}
