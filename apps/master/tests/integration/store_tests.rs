//! Entity-store CRUD coverage over in-memory SQLite.

use datalink_master::db::DbPool;
use datalink_master::models::{
    CreateJobRequest, SchemaSourceType, SourceType, UpsertNetworkRequest, UpsertSchemaRequest,
};

async fn store() -> DbPool {
    let pool = DbPool::new_in_memory().await.unwrap();
    pool.run_migrations().await.unwrap();
    pool
}

fn schema_request(name: &str) -> UpsertSchemaRequest {
    UpsertSchemaRequest {
        name: name.into(),
        source_type: SchemaSourceType::Query,
        sql_command: "SELECT id, name FROM users".into(),
        target_table: "users_copy".into(),
        unique_key_column: "id".into(),
        description: String::new(),
        file_format: "csv".into(),
        file_pattern: String::new(),
        has_header: true,
        delimiter: ",".into(),
    }
}

fn network_request(name: &str) -> UpsertNetworkRequest {
    UpsertNetworkRequest {
        name: name.into(),
        source_type: SourceType::Database,
        db_driver: "postgres".into(),
        db_host: "db.tenant.internal".into(),
        db_port: "5432".into(),
        db_user: "reader".into(),
        db_password: "secret".into(),
        db_name: "appdb".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn schema_crud_round_trip() {
    let pool = store().await;

    let created = pool.insert_schema(&schema_request("users")).await.unwrap();
    assert_eq!(created.target_table, "users_copy");
    assert_eq!(created.unique_key_column, "id");

    let mut edit = schema_request("users");
    edit.unique_key_column = String::new();
    let updated = pool.update_schema(created.id, &edit).await.unwrap();
    assert!(updated.unique_key_column.is_empty());

    assert_eq!(pool.list_schemas().await.unwrap().len(), 1);
    assert!(pool.delete_schema(created.id).await.unwrap());
    assert!(pool.get_schema_by_id(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn network_names_are_unique_and_status_upserts() {
    let pool = store().await;

    let net = pool.insert_network(&network_request("tenant-1")).await.unwrap();
    assert_eq!(net.status, "offline");

    // a REGISTER for an unknown agent creates its network row
    pool.upsert_agent_status("tenant-2", datalink_master::models::NetworkStatus::Online, "10.0.0.9:5412")
        .await
        .unwrap();
    let auto = pool.find_network_by_name("tenant-2").await.unwrap().unwrap();
    assert_eq!(auto.status, "online");
    assert!(auto.last_seen.is_some());

    pool.mark_agent_offline("tenant-2").await.unwrap();
    let offline = pool.find_network_by_name("tenant-2").await.unwrap().unwrap();
    assert_eq!(offline.status, "offline");
}

#[tokio::test]
async fn agent_name_overrides_routing() {
    let pool = store().await;

    let mut req = network_request("branch-db");
    req.agent_name = "edge-agent-7".into();
    let net = pool.insert_network(&req).await.unwrap();
    assert_eq!(net.routing_name(), "edge-agent-7");

    let plain = pool.insert_network(&network_request("tenant-1")).await.unwrap();
    assert_eq!(plain.routing_name(), "tenant-1");
}

#[tokio::test]
async fn job_references_must_exist() {
    let pool = store().await;

    let missing = pool
        .insert_job(&CreateJobRequest {
            name: "sync".into(),
            schema_id: 99,
            network_id: 99,
            schedule: String::new(),
            enabled: true,
            created_by: String::new(),
        })
        .await;
    assert!(missing.is_err());

    let schema = pool.insert_schema(&schema_request("users")).await.unwrap();
    let network = pool.insert_network(&network_request("tenant-1")).await.unwrap();

    let job = pool
        .insert_job(&CreateJobRequest {
            name: "sync".into(),
            schema_id: schema.id,
            network_id: network.id,
            schedule: String::new(),
            enabled: true,
            created_by: "ops".into(),
        })
        .await
        .unwrap();

    // empty schedule normalizes to the manual sentinel
    assert_eq!(job.schedule, "manual");
    assert_eq!(job.status, "pending");
    assert!(job.last_run.is_none());

    let refs = pool.get_job_with_refs(job.id).await.unwrap().unwrap();
    assert_eq!(refs.schema.id, schema.id);
    assert_eq!(refs.network.id, network.id);
}

#[tokio::test]
async fn settings_override_env_fallback_for_the_sink() {
    let pool = store().await;

    let fallback = datalink_master::config::TargetDbSettings {
        driver: "postgres".into(),
        host: "env-host".into(),
        port: "5432".into(),
        user: "env-user".into(),
        password: String::new(),
        db_name: "warehouse".into(),
        sslmode: "disable".into(),
    };

    let resolved = pool.load_target_db_settings(&fallback).await.unwrap();
    assert_eq!(resolved.host, "env-host");

    pool.set_setting("target_db_host", "settings-host").await.unwrap();
    pool.set_setting("target_db_driver", "mysql").await.unwrap();

    let resolved = pool.load_target_db_settings(&fallback).await.unwrap();
    assert_eq!(resolved.host, "settings-host");
    assert_eq!(resolved.driver, "mysql");
    // untouched keys keep the fallback
    assert_eq!(resolved.db_name, "warehouse");
}
