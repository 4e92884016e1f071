//! Datalink master - main entry point.
//!
//! Startup order: logging, config, entity store + migrations, target
//! sink, registry/broker/executor, agent listener task, scheduler task,
//! operator HTTP API. Exit code 1 on any fatal startup error.

mod api;
mod config;
mod db;
mod entity;
mod error;
mod migration;
mod models;
mod services;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::{
    listener::AgentListener, scheduler::Scheduler, CommandBroker, ConnectionRegistry, JobExecutor,
    TargetSink,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // LOG_LEVEL holds a tracing filter ("info", "datalink_master=debug", ...);
    // LOG_FILE redirects output from stdout to a file.
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let _log_guard = match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path.parent().unwrap_or(std::path::Path::new(".")).to_path_buf();
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "master.log".into());
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, file),
            );
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Datalink Master");
    info!("  agent port: {}", config.agent_listener.port);
    info!("  operator API: {}", config.http.bind_address());
    info!("========================================");

    // Entity store. Unreachable storage is fatal.
    let pool = match DbPool::new(&config.store).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open entity store: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pool.run_migrations().await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    // Target sink: Settings rows override the TARGET_DB_* env fallback.
    // A configured-but-unreachable target is fatal; an unconfigured one
    // leaves the sink disabled.
    let target_settings = match pool.load_target_db_settings(&config.target_db).await {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load target DB settings: {}", e);
            std::process::exit(1);
        }
    };
    let sink = match TargetSink::connect(&target_settings).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to connect target database: {}", e);
            std::process::exit(1);
        }
    };

    let registry = ConnectionRegistry::new();
    let broker = CommandBroker::new();
    let executor = Arc::new(JobExecutor::new(pool.clone(), registry.clone(), sink));

    // Agent listener task. A bind failure after this point is fatal.
    let listener = AgentListener::new(
        pool.clone(),
        registry.clone(),
        executor.clone(),
        broker.clone(),
        config.agent_listener.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Agent listener failed: {}", e);
            std::process::exit(1);
        }
    });

    // Scheduler task: immediate pass, then a 60s tick.
    Scheduler::new(pool.clone(), executor.clone()).start();

    let bind_address = config.http.bind_address();
    info!("Operator API listening on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(broker.clone()))
            .app_data(web::Data::new(executor.clone()))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_schema_routes)
                    .configure(api::configure_network_routes)
                    .configure(api::configure_job_routes)
                    .configure(api::configure_token_routes)
                    .configure(api::configure_settings_routes)
                    .configure(api::configure_agent_routes)
                    .configure(api::configure_audit_routes),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
