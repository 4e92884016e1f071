//! Network CRUD endpoints plus the connection probe.

use actix_web::{web, HttpResponse};

use datalink_wire::{ApiConfig, DbConfig, FtpConfig, MessageType, MongoConfig, RedisConfig, WireMessage};

use crate::db::DbPool;
use crate::entity::network;
use crate::error::{AppError, AppResult};
use crate::models::UpsertNetworkRequest;
use crate::services::{CommandBroker, ConnectionRegistry};

async fn list(pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let networks = pool.list_networks().await?;
    Ok(HttpResponse::Ok().json(networks))
}

async fn get(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let net = pool
        .get_network_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Network {}", id)))?;
    Ok(HttpResponse::Ok().json(net))
}

async fn create(
    pool: web::Data<DbPool>,
    body: web::Json<UpsertNetworkRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.name.is_empty() {
        return Err(AppError::InvalidInput("name is required".into()));
    }
    if pool.find_network_by_name(&req.name).await?.is_some() {
        return Err(AppError::InvalidInput(format!(
            "network '{}' already exists",
            req.name
        )));
    }

    let net = pool.insert_network(&req).await?;
    let _ = pool
        .record_audit("", "CREATE", "NETWORK", &net.id.to_string(), &net.name)
        .await;
    Ok(HttpResponse::Created().json(net))
}

async fn update(
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
    body: web::Json<UpsertNetworkRequest>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let net = pool.update_network(id, &body.into_inner()).await?;
    let _ = pool
        .record_audit("", "UPDATE", "NETWORK", &id.to_string(), &net.name)
        .await;
    Ok(HttpResponse::Ok().json(net))
}

async fn delete(pool: web::Data<DbPool>, path: web::Path<i64>) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    if !pool.delete_network(id).await? {
        return Err(AppError::NotFound(format!("Network {}", id)));
    }
    let _ = pool
        .record_audit("", "DELETE", "NETWORK", &id.to_string(), "")
        .await;
    Ok(HttpResponse::NoContent().finish())
}

/// Ask the owning agent to open a probe connection of the network's
/// source type and report `{success, duration_ms, version?, error?}`.
async fn test_connection(
    pool: web::Data<DbPool>,
    registry: web::Data<ConnectionRegistry>,
    broker: web::Data<CommandBroker>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let net = pool
        .get_network_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Network {}", id)))?;

    let (request_id, rx) = broker.register_request().await;
    let command = build_test_connection(&net, &request_id);

    registry.send(net.routing_name(), &command).await?;
    let result = broker.wait(&request_id, rx).await?;

    Ok(HttpResponse::Ok().json(result.data))
}

fn build_test_connection(net: &network::Model, request_id: &str) -> WireMessage {
    let mut msg = WireMessage::new(MessageType::TestConnection);
    msg.data.insert(
        "request_id".into(),
        serde_json::Value::String(request_id.to_string()),
    );
    msg.data.insert(
        "source_type".into(),
        serde_json::Value::String(net.source_type.clone()),
    );

    let insert = |msg: &mut WireMessage, key: &str, value: serde_json::Value| {
        msg.data.insert(key.to_string(), value);
    };

    if let Ok(v) = serde_json::to_value(DbConfig {
        driver: net.db_driver.clone(),
        host: net.db_host.clone(),
        port: net.db_port.clone(),
        user: net.db_user.clone(),
        password: net.db_password.clone(),
        db_name: net.db_name.clone(),
        sslmode: net.db_sslmode.clone(),
    }) {
        insert(&mut msg, "db_config", v);
    }
    if let Ok(v) = serde_json::to_value(FtpConfig {
        host: net.ftp_host.clone(),
        port: net.ftp_port.clone(),
        user: net.ftp_user.clone(),
        password: net.ftp_password.clone(),
        private_key: net.ftp_private_key.clone(),
        path: net.ftp_path.clone(),
        passive: net.ftp_passive,
    }) {
        insert(&mut msg, "ftp_config", v);
    }
    if let Ok(v) = serde_json::to_value(ApiConfig {
        url: net.api_url.clone(),
        method: net.api_method.clone(),
        headers: net.api_headers.clone(),
        auth_type: net.api_auth_type.clone(),
        auth_key: net.api_auth_key.clone(),
        auth_value: net.api_auth_value.clone(),
        body: net.api_body.clone(),
    }) {
        insert(&mut msg, "api_config", v);
    }
    if let Ok(v) = serde_json::to_value(MongoConfig {
        host: net.mongo_host.clone(),
        port: net.mongo_port.clone(),
        user: net.mongo_user.clone(),
        password: net.mongo_password.clone(),
        database: net.mongo_database.clone(),
        collection: net.mongo_collection.clone(),
        auth_db: net.mongo_auth_db.clone(),
    }) {
        insert(&mut msg, "mongo_config", v);
    }
    if let Ok(v) = serde_json::to_value(RedisConfig {
        host: net.redis_host.clone(),
        port: net.redis_port.clone(),
        password: net.redis_password.clone(),
        db: net.redis_db,
        pattern: net.redis_pattern.clone(),
    }) {
        insert(&mut msg, "redis_config", v);
    }

    msg
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/networks")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/networks/{id}")
            .route(web::get().to(get))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    )
    .service(web::resource("/networks/{id}/test").route(web::post().to(test_connection)));
}
