//! Scheduler invariants over the real store and executor path.

use std::sync::Arc;

use chrono::Utc;

use datalink_master::db::DbPool;
use datalink_master::models::{
    CreateJobRequest, JobStatus, SchemaSourceType, SourceType, UpsertNetworkRequest,
    UpsertSchemaRequest,
};
use datalink_master::services::scheduler::Scheduler;
use datalink_master::services::{ConnectionRegistry, JobExecutor, TargetSink};

async fn store() -> DbPool {
    let pool = DbPool::new_in_memory().await.unwrap();
    pool.run_migrations().await.unwrap();
    pool
}

async fn seed_job(pool: &DbPool, schedule: &str, enabled: bool) -> i64 {
    let schema = pool
        .insert_schema(&UpsertSchemaRequest {
            name: "users".into(),
            source_type: SchemaSourceType::Query,
            sql_command: "SELECT 1".into(),
            target_table: "users_copy".into(),
            unique_key_column: String::new(),
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
            name: format!("tenant-{}", schema.id),
            source_type: SourceType::Database,
            ..Default::default()
        })
        .await
        .unwrap();

    pool.insert_job(&CreateJobRequest {
        name: "scheduled-sync".into(),
        schema_id: schema.id,
        network_id: network.id,
        schedule: schedule.into(),
        enabled,
        created_by: String::new(),
    })
    .await
    .unwrap()
    .id
}

fn scheduler(pool: &DbPool) -> Scheduler {
    let executor = Arc::new(JobExecutor::new(
        pool.clone(),
        ConnectionRegistry::new(),
        Arc::new(TargetSink::disabled()),
    ));
    Scheduler::new(pool.clone(), executor)
}

/// Let the spawned dispatch tasks run to completion.
async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}

#[tokio::test]
async fn disabled_jobs_never_fire() {
    let pool = store().await;
    let job_id = seed_job(&pool, "*/1 * * * *", false).await;

    scheduler(&pool).run_pass(Utc::now()).await.unwrap();
    settle().await;

    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "pending");
    assert!(job.last_run.is_none());
    assert!(pool.list_job_logs(job_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_jobs_never_fire() {
    let pool = store().await;
    let job_id = seed_job(&pool, "manual", true).await;

    scheduler(&pool).run_pass(Utc::now()).await.unwrap();
    settle().await;

    assert!(pool.list_job_logs(job_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_cron_is_skipped_without_firing() {
    let pool = store().await;
    let job_id = seed_job(&pool, "every tuesday", true).await;

    scheduler(&pool).run_pass(Utc::now()).await.unwrap();
    settle().await;

    assert!(pool.list_job_logs(job_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn running_jobs_are_not_dispatched_again() {
    let pool = store().await;
    let job_id = seed_job(&pool, "*/1 * * * *", true).await;

    pool.set_job_status(job_id, JobStatus::Running).await.unwrap();
    scheduler(&pool).run_pass(Utc::now()).await.unwrap();
    settle().await;

    // no new log appeared; the running guard held
    assert!(pool.list_job_logs(job_id, 10).await.unwrap().is_empty());
    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "running");
}

#[tokio::test]
async fn due_job_fires_and_fails_without_a_connected_agent() {
    let pool = store().await;
    let job_id = seed_job(&pool, "*/1 * * * *", true).await;

    let tick = Utc::now();
    scheduler(&pool).run_pass(tick).await.unwrap();
    settle().await;

    // fired exactly once; with no agent session the dispatch fails
    let job = pool.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert!(job.last_run.is_some());

    let logs = pool.list_job_logs(job_id, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("not connected"));

    // a second pass at the same instant does not fire again
    scheduler(&pool).run_pass(tick).await.unwrap();
    settle().await;
    assert_eq!(pool.list_job_logs(job_id, 10).await.unwrap().len(), 1);
}
