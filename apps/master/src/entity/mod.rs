//! SeaORM entities for the embedded entity store.

pub mod agent_token;
pub mod audit_log;
pub mod job;
pub mod job_log;
pub mod network;
pub mod schema;
pub mod setting;
pub mod user;
