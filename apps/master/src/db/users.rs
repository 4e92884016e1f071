//! Database queries for users. CRUD only; authentication lives outside
//! this core.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::user::{self, ActiveModel, Entity as User};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    pub async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> AppResult<user::Model> {
        let now = Utc::now();

        let model = ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash.to_string()),
            role: Set(role.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert user: {}", e)))?;

        Ok(result)
    }

    pub async fn find_user_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        let result = User::find()
            .filter(user::Column::Username.eq(username))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find user: {}", e)))?;

        Ok(result)
    }

    pub async fn list_users(&self) -> AppResult<Vec<user::Model>> {
        let result = User::find()
            .order_by_asc(user::Column::Username)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list users: {}", e)))?;

        Ok(result)
    }

    pub async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let result = User::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete user: {}", e)))?;

        Ok(result.rows_affected > 0)
    }
}
