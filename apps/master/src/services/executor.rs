//! Job executor: RUN_JOB dispatch and streamed-response handling.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use datalink_wire::{
    sample_records, ApiConfig, DataResponseData, DbConfig, FileConfig, FtpConfig, MessageType,
    MongoConfig, RedisConfig, RunJobData, WireMessage,
};

use crate::db::{jobs::JobWithRefs, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{JobStatus, LogStatus};
use crate::services::{ConnectionRegistry, TargetSink};

/// Error message the reaper stamps on orphaned running logs.
const REAP_MESSAGE: &str = "agent disconnect";

pub struct JobExecutor {
    pool: DbPool,
    registry: ConnectionRegistry,
    sink: Arc<TargetSink>,
}

impl JobExecutor {
    pub fn new(pool: DbPool, registry: ConnectionRegistry, sink: Arc<TargetSink>) -> Self {
        Self {
            pool,
            registry,
            sink,
        }
    }

    /// Dispatch a job: mark it running, open a JobLog, and send RUN_JOB
    /// through the registry. A missing session fails the job and log
    /// immediately. Returns the log id.
    pub async fn dispatch(&self, job_id: i64, triggered_by: &str) -> AppResult<i64> {
        let refs = self
            .pool
            .get_job_with_refs(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))?;

        self.pool.mark_job_running(job_id, Utc::now()).await?;
        let log = self.pool.insert_running_log(job_id).await?;

        let agent_name = refs.network.routing_name().to_string();
        let command = build_run_job(&refs, log.id);

        if let Err(e) = self.registry.send(&agent_name, &command).await {
            let message = format!("agent '{}' is not connected", agent_name);
            warn!(job_id, log_id = log.id, %message, "dispatch failed");
            self.pool.set_job_status(job_id, JobStatus::Failed).await?;
            self.pool.fail_log(log.id, &message).await?;
            return Err(e);
        }

        info!(job_id, log_id = log.id, agent = %agent_name, triggered_by, "RUN_JOB dispatched");
        Ok(log.id)
    }

    /// Apply one streamed DATA_RESPONSE frame.
    pub async fn handle_data_response(&self, msg: &WireMessage) -> AppResult<()> {
        let data: DataResponseData = msg.decode_data().map_err(|e| {
            AppError::InvalidInput(format!("malformed DATA_RESPONSE payload: {}", e))
        })?;

        // sink target comes from the job's schema, not the frame
        let refs = self.pool.get_job_with_refs(data.job_id).await?;
        let (target_table, unique_key) = match &refs {
            Some(refs) => (
                refs.schema.target_table.clone(),
                refs.schema.unique_key_column.clone(),
            ),
            None => (String::new(), String::new()),
        };

        let mut inserted = 0u64;
        if !data.records.is_empty() && !target_table.is_empty() {
            match self
                .sink
                .write_batch(&target_table, &unique_key, &data.records)
                .await
            {
                Ok(count) => inserted = count,
                Err(e) => warn!(table = %target_table, error = %e, "batch write failed"),
            }
        }

        let sample = sample_records(&data.records);
        let error = (!data.error.is_empty()).then(|| data.error.clone());
        let failed = error.is_some();
        self.pool
            .apply_log_batch(data.log_id, data.record_count, sample, error)
            .await?;

        if data.partial {
            info!(
                job_id = data.job_id,
                log_id = data.log_id,
                batch = data.record_count,
                inserted,
                "partial batch applied"
            );
            return Ok(());
        }

        // terminal frame: finalize log and job
        let log_status = if failed {
            LogStatus::Failed
        } else {
            LogStatus::Completed
        };
        let job_status = if failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };

        self.pool.finalize_log(data.log_id, log_status).await?;
        if refs.is_some() {
            self.pool.set_job_status(data.job_id, job_status).await?;
        }

        info!(
            job_id = data.job_id,
            log_id = data.log_id,
            status = %log_status,
            inserted,
            "job stream finished"
        );
        Ok(())
    }

    /// Reaper: when an operator reads a failed job, flip any lingering
    /// running logs to failed. A session that died mid-stream leaves
    /// exactly this state behind.
    pub async fn reap_job_logs(&self, job_id: i64) -> AppResult<()> {
        let Some(job) = self.pool.get_job_by_id(job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Failed.as_str() {
            return Ok(());
        }

        let reaped = self
            .pool
            .reap_running_logs(job_id, REAP_MESSAGE, Utc::now())
            .await?;
        if reaped > 0 {
            info!(job_id, reaped, "reaped orphaned running logs");
        }
        Ok(())
    }
}

/// Assemble the RUN_JOB frame: identifiers, the query, the sink echo
/// fields, and all six config bundles - the agent selects one by
/// `source_type`.
fn build_run_job(refs: &JobWithRefs, log_id: i64) -> WireMessage {
    let schema = &refs.schema;
    let network = &refs.network;

    let data = RunJobData {
        job_id: refs.job.id,
        log_id,
        name: refs.job.name.clone(),
        source_type: network.source_type.clone(),
        query: schema.sql_command.clone(),
        target_table: schema.target_table.clone(),
        unique_key_column: schema.unique_key_column.clone(),
        db_config: DbConfig {
            driver: network.db_driver.clone(),
            host: network.db_host.clone(),
            port: network.db_port.clone(),
            user: network.db_user.clone(),
            password: network.db_password.clone(),
            db_name: network.db_name.clone(),
            sslmode: network.db_sslmode.clone(),
        },
        ftp_config: FtpConfig {
            host: network.ftp_host.clone(),
            port: network.ftp_port.clone(),
            user: network.ftp_user.clone(),
            password: network.ftp_password.clone(),
            private_key: network.ftp_private_key.clone(),
            path: network.ftp_path.clone(),
            passive: network.ftp_passive,
        },
        file_config: FileConfig {
            format: schema.file_format.clone(),
            pattern: schema.file_pattern.clone(),
            has_header: schema.has_header,
            delimiter: schema.delimiter.clone(),
        },
        api_config: ApiConfig {
            url: network.api_url.clone(),
            method: network.api_method.clone(),
            headers: network.api_headers.clone(),
            auth_type: network.api_auth_type.clone(),
            auth_key: network.api_auth_key.clone(),
            auth_value: network.api_auth_value.clone(),
            body: network.api_body.clone(),
        },
        mongo_config: MongoConfig {
            host: network.mongo_host.clone(),
            port: network.mongo_port.clone(),
            user: network.mongo_user.clone(),
            password: network.mongo_password.clone(),
            database: network.mongo_database.clone(),
            collection: network.mongo_collection.clone(),
            auth_db: network.mongo_auth_db.clone(),
        },
        redis_config: RedisConfig {
            host: network.redis_host.clone(),
            port: network.redis_port.clone(),
            password: network.redis_password.clone(),
            db: network.redis_db,
            pattern: network.redis_pattern.clone(),
        },
    };

    WireMessage::new(MessageType::RunJob).with_data(&data)
}

/// CONFIG_PULL answer: the agent's job list plus its network db block
/// as the default source.
pub async fn build_config_response(pool: &DbPool, agent_name: &str) -> AppResult<WireMessage> {
    let mut job_configs = Vec::new();
    let mut db_config = serde_json::Map::new();

    if let Some(network) = pool.find_network_by_name(agent_name).await? {
        for job in pool.list_jobs().await? {
            if job.network_id != network.id {
                continue;
            }
            let Some(schema) = pool.get_schema_by_id(job.schema_id).await? else {
                continue;
            };
            job_configs.push(json!({
                "job_id": job.id,
                "name": job.name,
                "schedule": job.schedule,
                "query": schema.sql_command,
                "target_table": schema.target_table,
            }));
        }

        if !network.db_host.is_empty() {
            db_config = serde_json::to_value(DbConfig {
                driver: network.db_driver.clone(),
                host: network.db_host.clone(),
                port: network.db_port.clone(),
                user: network.db_user.clone(),
                password: network.db_password.clone(),
                db_name: network.db_name.clone(),
                sslmode: network.db_sslmode.clone(),
            })?
            .as_object()
            .cloned()
            .unwrap_or_default();
        }
    }

    let mut msg = WireMessage::new(MessageType::ConfigResponse);
    msg.data
        .insert("jobs".into(), serde_json::Value::Array(job_configs));
    msg.data
        .insert("db_config".into(), serde_json::Value::Object(db_config));
    Ok(msg)
}
