//! Database queries for schemas.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};

use crate::entity::schema::{self, ActiveModel, Entity as Schema};
use crate::error::{AppError, AppResult};
use crate::models::UpsertSchemaRequest;

use super::DbPool;

impl DbPool {
    /// Insert a new schema.
    pub async fn insert_schema(&self, req: &UpsertSchemaRequest) -> AppResult<schema::Model> {
        let now = Utc::now();

        let model = ActiveModel {
            name: Set(req.name.clone()),
            source_type: Set(req.source_type.as_str().to_string()),
            sql_command: Set(req.sql_command.clone()),
            target_table: Set(req.target_table.clone()),
            unique_key_column: Set(req.unique_key_column.clone()),
            description: Set(req.description.clone()),
            file_format: Set(if req.file_format.is_empty() {
                "csv".to_string()
            } else {
                req.file_format.clone()
            }),
            file_pattern: Set(req.file_pattern.clone()),
            has_header: Set(req.has_header),
            delimiter: Set(if req.delimiter.is_empty() {
                ",".to_string()
            } else {
                req.delimiter.clone()
            }),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert schema: {}", e)))?;

        Ok(result)
    }

    /// Get a schema by ID.
    pub async fn get_schema_by_id(&self, id: i64) -> AppResult<Option<schema::Model>> {
        let result = Schema::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get schema: {}", e)))?;

        Ok(result)
    }

    /// List all schemas, newest first.
    pub async fn list_schemas(&self) -> AppResult<Vec<schema::Model>> {
        let result = Schema::find()
            .order_by_desc(schema::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list schemas: {}", e)))?;

        Ok(result)
    }

    /// Replace a schema's fields.
    pub async fn update_schema(
        &self,
        id: i64,
        req: &UpsertSchemaRequest,
    ) -> AppResult<schema::Model> {
        let existing = self
            .get_schema_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Schema {}", id)))?;

        let mut active: ActiveModel = existing.into();
        active.name = Set(req.name.clone());
        active.source_type = Set(req.source_type.as_str().to_string());
        active.sql_command = Set(req.sql_command.clone());
        active.target_table = Set(req.target_table.clone());
        active.unique_key_column = Set(req.unique_key_column.clone());
        active.description = Set(req.description.clone());
        active.file_format = Set(req.file_format.clone());
        active.file_pattern = Set(req.file_pattern.clone());
        active.has_header = Set(req.has_header);
        active.delimiter = Set(req.delimiter.clone());
        active.updated_at = Set(Utc::now());

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update schema: {}", e)))?;

        Ok(result)
    }

    /// Delete a schema.
    pub async fn delete_schema(&self, id: i64) -> AppResult<bool> {
        let result = Schema::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete schema: {}", e)))?;

        Ok(result.rows_affected > 0)
    }
}
