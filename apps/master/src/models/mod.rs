//! Domain models and API DTOs.

pub mod job;
pub mod network;
pub mod schema;
pub mod token;

pub use job::{CreateJobRequest, JobStatus, LogStatus, UpdateJobRequest};
pub use network::{NetworkStatus, SourceType, UpsertNetworkRequest};
pub use schema::{SchemaSourceType, UpsertSchemaRequest};
pub use token::{CreateTokenRequest, CreatedTokenResponse, TokenView};
