//! Job endpoints: CRUD, manual run, enable/disable, and logs.

use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CreateJobRequest, UpdateJobRequest};
use crate::services::JobExecutor;

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let jobs = pool.list_jobs().await?;
    Ok(HttpResponse::Ok().json(jobs))
}

/// Get one job with its recent logs. Reading a failed job also reaps
/// any logs orphaned in `running` by a mid-stream disconnect.
async fn get(
    pool: web::Data<DbPool>,
    executor: web::Data<Arc<JobExecutor>>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job = pool
        .get_job_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

    executor.reap_job_logs(id).await?;
    let logs = pool.list_job_logs(id, 10).await?;

    Ok(HttpResponse::Ok().json(json!({ "job": job, "logs": logs })))
}

async fn create(
    pool: web::Data<DbPool>,
    body: web::Json<CreateJobRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.name.is_empty() {
        return Err(AppError::InvalidInput("name is required".into()));
    }

    let job = pool.insert_job(&req).await?;
    let _ = pool
        .record_audit(&req.created_by, "CREATE", "JOB", &job.id.to_string(), &job.name)
        .await;
    Ok(HttpResponse::Created().json(job))
}

async fn update(
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    body: web::Json<UpdateJobRequest>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let req = body.into_inner();
    let job = pool.update_job(id, &req).await?;
    let _ = pool
        .record_audit(&req.updated_by, "UPDATE", "JOB", &id.to_string(), &job.name)
        .await;
    Ok(HttpResponse::Ok().json(job))
}

async fn delete(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !pool.delete_job(id).await? {
        return Err(AppError::NotFound(format!("Job {}", id)));
    }
    let _ = pool.record_audit("", "DELETE", "JOB", &id.to_string(), "").await;
    Ok(HttpResponse::NoContent().finish())
}

/// Manual trigger: dispatch RUN_JOB immediately, bypassing the
/// schedule (but not the running-state guard on the agent side).
async fn run(
    pool: web::Data<DbPool>,
    executor: web::Data<Arc<JobExecutor>>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let log_id = executor.dispatch(id, "operator").await?;
    let _ = pool.record_audit("", "RUN", "JOB", &id.to_string(), "").await;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Job {} dispatched", id),
        "log_id": log_id,
    })))
}

async fn toggle(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job = pool.toggle_job(id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Job {} {}", job.name, if job.enabled { "enabled" } else { "paused" }),
        "enabled": job.enabled,
    })))
}

async fn logs(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let logs = pool.list_job_logs(path.into_inner(), 50).await?;
    Ok(HttpResponse::Ok().json(logs))
}

async fn recent_logs(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let logs = pool.recent_job_logs(10).await?;
    Ok(HttpResponse::Ok().json(logs))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/jobs")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/jobs/{id}")
            .route(web::get().to(get))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    )
    .service(web::resource("/jobs/{id}/run").route(web::post().to(run)))
    .service(web::resource("/jobs/{id}/toggle").route(web::post().to(toggle)))
    .service(web::resource("/jobs/{id}/logs").route(web::get().to(logs)))
    .service(web::resource("/logs/recent").route(web::get().to(recent_logs)));
}
