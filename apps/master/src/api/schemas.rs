//! Schema CRUD endpoints.

use actix_web::{web, HttpResponse};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::UpsertSchemaRequest;

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let schemas = pool.list_schemas().await?;
    Ok(HttpResponse::Ok().json(schemas))
}

async fn get(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let schema = pool
        .get_schema_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schema {}", id)))?;
    Ok(HttpResponse::Ok().json(schema))
}

async fn create(
    pool: web::Data<DbPool>,
    body: web::Json<UpsertSchemaRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.name.is_empty() || req.target_table.is_empty() {
        return Err(AppError::InvalidInput(
            "name and target_table are required".into(),
        ));
    }

    let schema = pool.insert_schema(&req).await?;
    let _ = pool
        .record_audit("", "CREATE", "SCHEMA", &schema.id.to_string(), &schema.name)
        .await;
    Ok(HttpResponse::Created().json(schema))
}

async fn update(
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    body: web::Json<UpsertSchemaRequest>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let schema = pool.update_schema(id, &body.into_inner()).await?;
    let _ = pool
        .record_audit("", "UPDATE", "SCHEMA", &id.to_string(), &schema.name)
        .await;
    Ok(HttpResponse::Ok().json(schema))
}

async fn delete(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !pool.delete_schema(id).await? {
        return Err(AppError::NotFound(format!("Schema {}", id)));
    }
    let _ = pool
        .record_audit("", "DELETE", "SCHEMA", &id.to_string(), "")
        .await;
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/schemas")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/schemas/{id}")
            .route(web::get().to(get))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    );
}
