//! Operator API endpoint modules (JSON only; the web console consuming
//! these lives outside this repository).

pub mod agents;
pub mod audit;
pub mod health;
pub mod jobs;
pub mod networks;
pub mod schemas;
pub mod settings;
pub mod tokens;

pub use agents::configure_routes as configure_agent_routes;
pub use audit::configure_routes as configure_audit_routes;
pub use health::configure_routes as configure_health_routes;
pub use jobs::configure_routes as configure_job_routes;
pub use networks::configure_routes as configure_network_routes;
pub use schemas::configure_routes as configure_schema_routes;
pub use settings::configure_routes as configure_settings_routes;
pub use tokens::configure_routes as configure_token_routes;
