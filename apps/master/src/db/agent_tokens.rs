//! Database queries for agent tokens.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::agent_token::{self, ActiveModel, Entity as AgentToken};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    /// Insert a freshly minted token record.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_agent_token(
        &self,
        agent_name: &str,
        token_hash: &str,
        token_prefix: &str,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
        created_by: &str,
    ) -> AppResult<agent_token::Model> {
        let model = ActiveModel {
            agent_name: Set(agent_name.to_string()),
            token_hash: Set(token_hash.to_string()),
            token_prefix: Set(token_prefix.to_string()),
            description: Set(description.to_string()),
            expires_at: Set(expires_at),
            revoked: Set(false),
            last_used_at: Set(None),
            created_by: Set(created_by.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert token: {}", e)))?;

        Ok(result)
    }

    /// Get a token by ID.
    pub async fn get_agent_token(&self, id: i64) -> AppResult<Option<agent_token::Model>> {
        let result = AgentToken::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get token: {}", e)))?;

        Ok(result)
    }

    /// Find the token record for an agent, if one exists.
    pub async fn find_token_for_agent(
        &self,
        agent_name: &str,
    ) -> AppResult<Option<agent_token::Model>> {
        let result = AgentToken::find()
            .filter(agent_token::Column::AgentName.eq(agent_name))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find token: {}", e)))?;

        Ok(result)
    }

    /// List all tokens, newest first.
    pub async fn list_agent_tokens(&self) -> AppResult<Vec<agent_token::Model>> {
        let result = AgentToken::find()
            .order_by_desc(agent_token::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list tokens: {}", e)))?;

        Ok(result)
    }

    /// Revoke a token (soft delete).
    pub async fn revoke_agent_token(&self, id: i64) -> AppResult<bool> {
        let Some(existing) = self.get_agent_token(id).await? else {
            return Ok(false);
        };

        let mut active: ActiveModel = existing.into();
        active.revoked = Set(true);
        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to revoke token: {}", e)))?;

        Ok(true)
    }

    /// Permanently delete a token.
    pub async fn delete_agent_token(&self, id: i64) -> AppResult<bool> {
        let result = AgentToken::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete token: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    /// Stamp last_used_at after a successful REGISTER.
    pub async fn touch_agent_token(&self, id: i64) -> AppResult<()> {
        let Some(existing) = self.get_agent_token(id).await? else {
            return Ok(());
        };

        let mut active: ActiveModel = existing.into();
        active.last_used_at = Set(Some(Utc::now()));
        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to touch token: {}", e)))?;

        Ok(())
    }
}
