//! Agent token management endpoints.

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::CreateTokenRequest;
use crate::services::agent_token;

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let tokens = agent_token::list_tokens(&pool).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Mint a token. The raw value appears in this response and nowhere
/// else, ever.
async fn create(
    pool: web::Data<DbPool>,
    body: web::Json<CreateTokenRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let created = agent_token::create_token(&pool, &req).await?;
    let _ = pool
        .record_audit(
            &req.created_by,
            "CREATE",
            "AGENT_TOKEN",
            &created.agent_name,
            &format!("Created token for agent '{}'", created.agent_name),
        )
        .await;
    Ok(HttpResponse::Created().json(created))
}

async fn revoke(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !pool.revoke_agent_token(id).await? {
        return Err(AppError::NotFound(format!("Token {}", id)));
    }
    let _ = pool
        .record_audit("", "REVOKE", "AGENT_TOKEN", &id.to_string(), "")
        .await;
    Ok(HttpResponse::Ok().json(json!({ "message": "Token revoked" })))
}

async fn delete(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !pool.delete_agent_token(id).await? {
        return Err(AppError::NotFound(format!("Token {}", id)));
    }
    let _ = pool
        .record_audit("", "DELETE", "AGENT_TOKEN", &id.to_string(), "")
        .await;
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tokens")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/tokens/{id}").route(web::delete().to(delete)))
    .service(web::resource("/tokens/{id}/revoke").route(web::post().to(revoke)));
}
