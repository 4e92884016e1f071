//! Audit log listing endpoint.

use actix_web::{web, HttpResponse};

use crate::db::DbPool;
use crate::error::AppResult;

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let entries = pool.list_audit_logs(100).await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/audit").route(web::get().to(list)));
}
