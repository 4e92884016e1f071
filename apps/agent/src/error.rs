//! Agent error types.
//!
//! Errors never unwind across the session boundary: an extraction
//! failure becomes the `error` field of a terminal DATA_RESPONSE, and a
//! probe failure becomes the `error` field of its result frame.

/// Agent-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection to master failed: {0}")]
    Master(String),

    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Session closed")]
    SessionClosed,
}

/// Convenience type alias for Results with AgentError.
pub type AgentResult<T> = Result<T, AgentError>;

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Master(err.to_string())
    }
}

impl From<datalink_wire::WireError> for AgentError {
    fn from(err: datalink_wire::WireError) -> Self {
        AgentError::Master(err.to_string())
    }
}

impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        AgentError::Source(err.to_string())
    }
}
