//! Agent token service: generation, verification, and management.

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{CreateTokenRequest, CreatedTokenResponse, TokenView};

/// Token prefix.
const TOKEN_PREFIX: &str = "dlk_";
/// Length of the random part of the token.
const TOKEN_RANDOM_LENGTH: usize = 32;
/// Length of the prefix stored for identification.
const TOKEN_PREFIX_LENGTH: usize = 8;

/// Generate a raw token and its display prefix.
fn generate_token() -> (String, String) {
    let random_part: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(TOKEN_RANDOM_LENGTH)
        .map(char::from)
        .collect();

    let full = format!("{}{}", TOKEN_PREFIX, random_part);
    let prefix = full.chars().take(TOKEN_PREFIX_LENGTH).collect();
    (full, prefix)
}

/// Hash a token using SHA-256.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a token for an agent. At most one token per agent; revoke or
/// delete the existing one first. The raw token is returned here and
/// never again.
pub async fn create_token(
    pool: &DbPool,
    req: &CreateTokenRequest,
) -> AppResult<CreatedTokenResponse> {
    if req.agent_name.is_empty() {
        return Err(AppError::InvalidInput("agent_name is required".into()));
    }

    if pool.find_token_for_agent(&req.agent_name).await?.is_some() {
        return Err(AppError::InvalidInput(format!(
            "a token already exists for agent '{}'; revoke or delete it first",
            req.agent_name
        )));
    }

    let (raw, prefix) = generate_token();
    let expires_at = (req.expires_in > 0).then(|| Utc::now() + Duration::days(req.expires_in));

    let stored = pool
        .insert_agent_token(
            &req.agent_name,
            &hash_token(&raw),
            &prefix,
            &req.description,
            expires_at,
            &req.created_by,
        )
        .await?;

    Ok(CreatedTokenResponse {
        token: raw,
        agent_name: stored.agent_name,
        token_prefix: stored.token_prefix,
        expires_at: stored.expires_at,
    })
}

/// Validate a raw token presented at REGISTER.
///
/// Enforcement is opt-in per agent: an agent with no token row registers
/// freely, but once a token exists it must be presented, unrevoked, and
/// unexpired. `last_used_at` is stamped on success.
pub async fn verify_register_token(
    pool: &DbPool,
    agent_name: &str,
    raw_token: &str,
) -> AppResult<()> {
    let Some(record) = pool.find_token_for_agent(agent_name).await? else {
        return Ok(());
    };

    if raw_token.is_empty() {
        return Err(AppError::Agent(format!(
            "agent '{}' requires a token",
            agent_name
        )));
    }

    if record.token_hash != hash_token(raw_token) {
        return Err(AppError::Agent("invalid agent token".into()));
    }

    if !record.is_valid(Utc::now()) {
        return Err(AppError::Agent("agent token is revoked or expired".into()));
    }

    // Best-effort stamp; a failed write must not reject the register.
    let _ = pool.touch_agent_token(record.id).await;

    Ok(())
}

/// List tokens for display: hash withheld.
pub async fn list_tokens(pool: &DbPool) -> AppResult<Vec<TokenView>> {
    let tokens = pool.list_agent_tokens().await?;
    Ok(tokens
        .into_iter()
        .map(|t| TokenView {
            id: t.id,
            agent_name: t.agent_name,
            token_prefix: t.token_prefix,
            description: t.description,
            revoked: t.revoked,
            expires_at: t.expires_at,
            last_used_at: t.last_used_at,
            created_at: t.created_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_have_prefix_and_length() {
        let (raw, prefix) = generate_token();
        assert!(raw.starts_with(TOKEN_PREFIX));
        assert_eq!(raw.len(), TOKEN_PREFIX.len() + TOKEN_RANDOM_LENGTH);
        assert_eq!(prefix.len(), TOKEN_PREFIX_LENGTH);
        assert!(raw.starts_with(&prefix));
    }

    #[test]
    fn hashing_is_deterministic_sha256() {
        let h1 = hash_token("dlk_abc123");
        let h2 = hash_token("dlk_abc123");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("dlk_abc124"));
    }

    #[tokio::test]
    async fn revoked_token_never_admits_register() {
        let pool = crate::db::DbPool::new_in_memory().await.unwrap();
        pool.run_migrations().await.unwrap();

        let created = create_token(
            &pool,
            &CreateTokenRequest {
                agent_name: "tenant-1".into(),
                description: String::new(),
                expires_in: 0,
                created_by: "ops".into(),
            },
        )
        .await
        .unwrap();

        verify_register_token(&pool, "tenant-1", &created.token)
            .await
            .unwrap();

        let record = pool.find_token_for_agent("tenant-1").await.unwrap().unwrap();
        assert!(record.last_used_at.is_some());

        pool.revoke_agent_token(record.id).await.unwrap();
        let err = verify_register_token(&pool, "tenant-1", &created.token)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("revoked or expired"));
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_when_one_is_issued() {
        let pool = crate::db::DbPool::new_in_memory().await.unwrap();
        pool.run_migrations().await.unwrap();

        create_token(
            &pool,
            &CreateTokenRequest {
                agent_name: "tenant-1".into(),
                description: String::new(),
                expires_in: 30,
                created_by: String::new(),
            },
        )
        .await
        .unwrap();

        assert!(verify_register_token(&pool, "tenant-1", "dlk_wrong")
            .await
            .is_err());
        assert!(verify_register_token(&pool, "tenant-1", "")
            .await
            .is_err());
        // agents without an issued token register freely
        verify_register_token(&pool, "tenant-2", "").await.unwrap();
    }
}
