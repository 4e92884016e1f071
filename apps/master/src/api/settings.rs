//! Settings endpoints, including the target-DB block.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct UpdateSettingRequest {
    key: String,
    value: String,
}

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let settings = pool.list_settings().await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// Upsert one setting. Target-DB changes take effect at the next
/// master restart, when the sink pool is rebuilt.
async fn update(
    pool: web::Data<DbPool>,
    body: web::Json<UpdateSettingRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.key.is_empty() {
        return Err(AppError::InvalidInput("key is required".into()));
    }

    pool.set_setting(&req.key, &req.value).await?;
    let _ = pool.record_audit("", "UPDATE", "SETTING", &req.key, "").await;
    Ok(HttpResponse::Ok().json(json!({ "key": req.key, "value": req.value })))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/settings")
            .route(web::get().to(list))
            .route(web::put().to(update)),
    );
}
