//! Connected-agent listing and the remote terminal endpoint.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use datalink_wire::{ExecCommandData, MessageType, WireMessage};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::services::{CommandBroker, ConnectionRegistry};

async fn list_connected(registry: web::Data<ConnectionRegistry>) -> AppResult<HttpResponse> {
    let agents = registry.list().await;
    Ok(HttpResponse::Ok().json(json!({ "agents": agents, "count": agents.len() })))
}

#[derive(Debug, Deserialize)]
struct ExecRequest {
    agent_name: String,
    command: String,
    /// Seconds; the agent defaults to 30 when absent.
    #[serde(default)]
    timeout: Option<u64>,
}

/// Run a shell command on an agent and relay captured output, exit
/// code, and duration back to the operator terminal.
async fn exec_command(
    pool: web::Data<DbPool>,
    registry: web::Data<ConnectionRegistry>,
    broker: web::Data<CommandBroker>,
    body: web::Json<ExecRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.agent_name.is_empty() || req.command.is_empty() {
        return Err(AppError::InvalidInput(
            "agent_name and command are required".into(),
        ));
    }

    let (request_id, rx) = broker.register_request().await;
    let msg = WireMessage::new(MessageType::ExecCommand).with_data(&ExecCommandData {
        request_id: request_id.clone(),
        command: req.command.clone(),
        timeout: req.timeout,
    });

    registry.send(&req.agent_name, &msg).await?;
    let result = broker.wait(&request_id, rx).await?;

    let _ = pool
        .record_audit("", "RUN", "TERMINAL", &req.agent_name, &req.command)
        .await;

    Ok(HttpResponse::Ok().json(result.data))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/agents").route(web::get().to(list_connected)))
        .service(web::resource("/terminal/exec").route(web::post().to(exec_command)));
}
