//! SeaORM migrations for the embedded store.
//!
//! Conventions:
//! - INTEGER autoincrement primary keys
//! - created_at / updated_at TEXT timestamps (RFC3339, UTC)
//! - string columns default to '' rather than NULL unless absence is
//!   meaningful (last_run, completed_at, expires_at, ...)

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_schemas;
mod m20250301_000002_create_networks;
mod m20250301_000003_create_jobs;
mod m20250301_000004_create_job_logs;
mod m20250301_000005_create_agent_tokens;
mod m20250301_000006_create_settings;
mod m20250301_000007_create_users;
mod m20250301_000008_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_schemas::Migration),
            Box::new(m20250301_000002_create_networks::Migration),
            Box::new(m20250301_000003_create_jobs::Migration),
            Box::new(m20250301_000004_create_job_logs::Migration),
            Box::new(m20250301_000005_create_agent_tokens::Migration),
            Box::new(m20250301_000006_create_settings::Migration),
            Box::new(m20250301_000007_create_users::Migration),
            Box::new(m20250301_000008_create_audit_logs::Migration),
        ]
    }
}
