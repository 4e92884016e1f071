//! Database queries for settings, including the target-DB block.

use chrono::Utc;
use sea_orm::{sea_query::OnConflict, EntityTrait, Set};

use crate::config::{defaults, TargetDbSettings};
use crate::entity::setting::{self, ActiveModel, Entity as Setting};
use crate::error::{AppError, AppResult};

use super::DbPool;

/// Settings keys holding the target sink connection block.
const TARGET_DB_KEYS: [&str; 7] = [
    "target_db_driver",
    "target_db_host",
    "target_db_port",
    "target_db_user",
    "target_db_password",
    "target_db_name",
    "target_db_sslmode",
];

impl DbPool {
    /// Get one setting value.
    pub async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        let result = Setting::find_by_id(key)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get setting: {}", e)))?;

        Ok(result.map(|s| s.value))
    }

    /// Upsert one setting.
    pub async fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let model = ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };

        Setting::insert(model)
            .on_conflict(
                OnConflict::column(setting::Column::Key)
                    .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to set setting: {}", e)))?;

        Ok(())
    }

    /// List every setting row.
    pub async fn list_settings(&self) -> AppResult<Vec<setting::Model>> {
        let result = Setting::find()
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list settings: {}", e)))?;

        Ok(result)
    }

    /// Resolve the sink connection block: Settings rows win, the
    /// env-derived fallback fills the gaps.
    pub async fn load_target_db_settings(
        &self,
        fallback: &TargetDbSettings,
    ) -> AppResult<TargetDbSettings> {
        let mut resolved = fallback.clone();

        for key in TARGET_DB_KEYS {
            let Some(value) = self.get_setting(key).await? else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "target_db_driver" => resolved.driver = value,
                "target_db_host" => resolved.host = value,
                "target_db_port" => resolved.port = value,
                "target_db_user" => resolved.user = value,
                "target_db_password" => resolved.password = value,
                "target_db_name" => resolved.db_name = value,
                "target_db_sslmode" => resolved.sslmode = value,
                _ => {}
            }
        }

        if resolved.driver.is_empty() {
            resolved.driver = defaults::TARGET_DB_DRIVER.into();
        }
        if resolved.port.is_empty() {
            resolved.port = defaults::TARGET_DB_PORT.into();
        }

        Ok(resolved)
    }
}
