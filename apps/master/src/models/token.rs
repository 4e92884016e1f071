//! Agent token DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to mint a token for an agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTokenRequest {
    pub agent_name: String,
    #[serde(default)]
    pub description: String,
    /// Days until expiry; 0 or absent means the token never expires.
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub created_by: String,
}

/// Returned exactly once, at creation - the raw token is never
/// recoverable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTokenResponse {
    pub token: String,
    pub agent_name: String,
    pub token_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Listing view: hash withheld, prefix shown for identification.
#[derive(Debug, Clone, Serialize)]
pub struct TokenView {
    pub id: i64,
    pub agent_name: String,
    pub token_prefix: String,
    pub description: String,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
