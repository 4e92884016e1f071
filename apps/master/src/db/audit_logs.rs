//! Database queries for audit logs.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, QuerySelect, Set};

use crate::entity::audit_log::{self, ActiveModel, Entity as AuditLog};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    /// Record one audit entry. Failures are reported but callers treat
    /// auditing as best-effort.
    pub async fn record_audit(
        &self,
        username: &str,
        action: &str,
        entity: &str,
        entity_id: &str,
        details: &str,
    ) -> AppResult<()> {
        let model = ActiveModel {
            username: Set(username.to_string()),
            action: Set(action.to_string()),
            entity: Set(entity.to_string()),
            entity_id: Set(entity_id.to_string()),
            details: Set(details.to_string()),
            ip_address: Set(String::new()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to record audit entry: {}", e)))?;

        Ok(())
    }

    /// Most recent audit entries.
    pub async fn list_audit_logs(&self, limit: u64) -> AppResult<Vec<audit_log::Model>> {
        let result = AuditLog::find()
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list audit logs: {}", e)))?;

        Ok(result)
    }
}
