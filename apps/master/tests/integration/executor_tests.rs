//! Executor flow tests: dispatch failure, streamed-batch accounting,
//! finalization, and the reaper. The sink stays disabled so everything
//! runs hermetically against in-memory SQLite.

use std::sync::Arc;

use serde_json::json;

use datalink_master::db::DbPool;
use datalink_master::models::{
    CreateJobRequest, SchemaSourceType, SourceType, UpsertNetworkRequest, UpsertSchemaRequest,
};
use datalink_master::services::{ConnectionRegistry, JobExecutor, TargetSink};
use datalink_wire::{DataResponseData, MessageType, Record, WireMessage};

async fn store() -> DbPool {
    let pool = DbPool::new_in_memory().await.unwrap();
    pool.run_migrations().await.unwrap();
    pool
}

async fn seed_job(pool: &DbPool) -> i64 {
    let schema = pool
        .insert_schema(&UpsertSchemaRequest {
            name: "users".into(),
            source_type: SchemaSourceType::Query,
            sql_command: "SELECT id, name FROM users".into(),
            target_table: "users_copy".into(),
            unique_key_column: "id".into(),
            description: String::new(),
            file_format: "csv".into(),
            file_pattern: String::new(),
            has_header: true,
            delimiter: ",".into(),
        })
        .await
        .unwrap();

    let network = pool
        .insert_network(&UpsertNetworkRequest {
            name: "tenant-1".into(),
            source_type: SourceType::Database,
            db_host: "db.tenant.internal".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    pool.insert_job(&CreateJobRequest {
        name: "sync-users".into(),
        schema_id: schema.id,
        network_id: network.id,
        schedule: "manual".into(),
        enabled: true,
        created_by: String::new(),
    })
    .await
    .unwrap()
    .id
}

fn executor(pool: &DbPool) -> JobExecutor {
    JobExecutor::new(
        pool.clone(),
        ConnectionRegistry::new(),
        Arc::new(TargetSink::disabled()),
    )
}

fn record(id: i64, name: &str) -> Record {
    let mut m = Record::new();
    m.insert("id".into(), json!(id));
    m.insert("name".into(), json!(name));
    m
}

fn data_response(job_id: i64, log_id: i64, records: Vec<Record>, partial: bool, error: &str) -> WireMessage {
    let count = records.len() as i64;
    WireMessage::new(MessageType::DataResponse)
        .with_agent("tenant-1")
        .with_data(&DataResponseData {
            job_id,
            log_id,
            status: if partial { "running" } else { "completed" }.into(),
            record_count: count,
            records,
            error: error.into(),
            partial,
        })
}

#[tokio::test]
async fn dispatch_without_agent_fails_job_and_log() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);

    let err = executor.dispatch(job_id, "operator").await.unwrap_err();
    assert!(err.to_string().contains("not connected"));

    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert!(job.last_run.is_some());

    let logs = pool.list_job_logs(job_id, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "failed");
    assert!(logs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("'tenant-1' is not connected"));
    assert!(logs[0].completed_at.is_some());
}

#[tokio::test]
async fn record_count_accumulates_across_partial_frames() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);

    pool.mark_job_running(job_id, chrono::Utc::now()).await.unwrap();
    let log = pool.insert_running_log(job_id).await.unwrap();

    // three partial batches, then the terminal frame
    for batch in [
        vec![record(1, "a"), record(2, "b")],
        vec![record(3, "c")],
        vec![record(4, "d"), record(5, "e"), record(6, "f")],
    ] {
        let msg = data_response(job_id, log.id, batch, true, "");
        executor.handle_data_response(&msg).await.unwrap();
    }

    let mid = pool.get_job_log(log.id).await.unwrap().unwrap();
    assert_eq!(mid.status, "running");
    assert_eq!(mid.record_count, 6);

    let terminal = data_response(job_id, log.id, Vec::new(), false, "");
    executor.handle_data_response(&terminal).await.unwrap();

    let done = pool.get_job_log(log.id).await.unwrap().unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.record_count, 6);
    assert!(done.completed_at.is_some());
    assert!(done.duration_ms.is_some());

    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
}

#[tokio::test]
async fn sample_comes_from_the_first_non_empty_batch() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);
    let log = pool.insert_running_log(job_id).await.unwrap();

    let first: Vec<Record> = (1..=8).map(|i| record(i, "x")).collect();
    executor
        .handle_data_response(&data_response(job_id, log.id, first, true, ""))
        .await
        .unwrap();
    executor
        .handle_data_response(&data_response(job_id, log.id, vec![record(9, "y")], true, ""))
        .await
        .unwrap();

    let stored = pool.get_job_log(log.id).await.unwrap().unwrap();
    let sample: Vec<Record> = serde_json::from_str(stored.sample_data.as_deref().unwrap()).unwrap();
    // capped at five, taken from the first batch only
    assert_eq!(sample.len(), 5);
    assert_eq!(sample[0]["id"], json!(1));
}

#[tokio::test]
async fn error_frame_fails_log_and_job() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);

    pool.mark_job_running(job_id, chrono::Utc::now()).await.unwrap();
    let log = pool.insert_running_log(job_id).await.unwrap();

    let failure = data_response(job_id, log.id, Vec::new(), false, "SQL syntax error near SELEC");
    executor.handle_data_response(&failure).await.unwrap();

    let stored = pool.get_job_log(log.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");
    assert!(stored.error_message.unwrap().contains("SQL syntax"));

    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
}

#[tokio::test]
async fn reaper_fails_orphaned_running_logs() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);

    // agent died mid-stream: job marked failed, log stuck running
    let log = pool.insert_running_log(job_id).await.unwrap();
    pool.set_job_status(job_id, datalink_master::models::JobStatus::Failed)
        .await
        .unwrap();

    executor.reap_job_logs(job_id).await.unwrap();

    let reaped = pool.get_job_log(log.id).await.unwrap().unwrap();
    assert_eq!(reaped.status, "failed");
    assert_eq!(reaped.error_message.as_deref(), Some("agent disconnect"));
    assert!(reaped.completed_at.is_some());
}

#[tokio::test]
async fn reaper_leaves_healthy_jobs_alone() {
    let pool = store().await;
    let job_id = seed_job(&pool).await;
    let executor = executor(&pool);

    let log = pool.insert_running_log(job_id).await.unwrap();
    // job still pending: nothing to reap
    executor.reap_job_logs(job_id).await.unwrap();

    let untouched = pool.get_job_log(log.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, "running");
}
