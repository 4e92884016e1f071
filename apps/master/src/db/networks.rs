//! Database queries for networks.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::network::{self, ActiveModel, Entity as Network};
use crate::error::{AppError, AppResult};
use crate::models::{NetworkStatus, UpsertNetworkRequest};

use super::DbPool;

impl DbPool {
    /// Insert a new network.
    pub async fn insert_network(&self, req: &UpsertNetworkRequest) -> AppResult<network::Model> {
        let now = Utc::now();

        let model = ActiveModel {
            name: Set(req.name.clone()),
            agent_name: Set(req.agent_name.clone()),
            ip_address: Set(req.ip_address.clone()),
            status: Set(NetworkStatus::Offline.as_str().to_string()),
            last_seen: Set(None),
            source_type: Set(req.source_type.as_str().to_string()),
            db_driver: Set(req.db_driver.clone()),
            db_host: Set(req.db_host.clone()),
            db_port: Set(req.db_port.clone()),
            db_user: Set(req.db_user.clone()),
            db_password: Set(req.db_password.clone()),
            db_name: Set(req.db_name.clone()),
            db_sslmode: Set(req.db_sslmode.clone()),
            ftp_host: Set(req.ftp_host.clone()),
            ftp_port: Set(req.ftp_port.clone()),
            ftp_user: Set(req.ftp_user.clone()),
            ftp_password: Set(req.ftp_password.clone()),
            ftp_private_key: Set(req.ftp_private_key.clone()),
            ftp_path: Set(req.ftp_path.clone()),
            ftp_passive: Set(req.ftp_passive),
            api_url: Set(req.api_url.clone()),
            api_method: Set(req.api_method.clone()),
            api_headers: Set(req.api_headers.clone()),
            api_auth_type: Set(req.api_auth_type.clone()),
            api_auth_key: Set(req.api_auth_key.clone()),
            api_auth_value: Set(req.api_auth_value.clone()),
            api_body: Set(req.api_body.clone()),
            mongo_host: Set(req.mongo_host.clone()),
            mongo_port: Set(req.mongo_port.clone()),
            mongo_user: Set(req.mongo_user.clone()),
            mongo_password: Set(req.mongo_password.clone()),
            mongo_database: Set(req.mongo_database.clone()),
            mongo_collection: Set(req.mongo_collection.clone()),
            mongo_auth_db: Set(req.mongo_auth_db.clone()),
            redis_host: Set(req.redis_host.clone()),
            redis_port: Set(req.redis_port.clone()),
            redis_password: Set(req.redis_password.clone()),
            redis_db: Set(req.redis_db),
            redis_pattern: Set(req.redis_pattern.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert network: {}", e)))?;

        Ok(result)
    }

    /// Get a network by ID.
    pub async fn get_network_by_id(&self, id: i64) -> AppResult<Option<network::Model>> {
        let result = Network::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get network: {}", e)))?;

        Ok(result)
    }

    /// Find a network by its unique name.
    pub async fn find_network_by_name(&self, name: &str) -> AppResult<Option<network::Model>> {
        let result = Network::find()
            .filter(network::Column::Name.eq(name))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to find network: {}", e)))?;

        Ok(result)
    }

    /// List all networks, newest first.
    pub async fn list_networks(&self) -> AppResult<Vec<network::Model>> {
        let result = Network::find()
            .order_by_desc(network::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list networks: {}", e)))?;

        Ok(result)
    }

    /// Replace a network's fields.
    pub async fn update_network(
        &self,
        id: i64,
        req: &UpsertNetworkRequest,
    ) -> AppResult<network::Model> {
        let existing = self
            .get_network_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Network {}", id)))?;

        let mut active: ActiveModel = existing.into();
        active.name = Set(req.name.clone());
        active.agent_name = Set(req.agent_name.clone());
        active.ip_address = Set(req.ip_address.clone());
        active.source_type = Set(req.source_type.as_str().to_string());
        active.db_driver = Set(req.db_driver.clone());
        active.db_host = Set(req.db_host.clone());
        active.db_port = Set(req.db_port.clone());
        active.db_user = Set(req.db_user.clone());
        active.db_password = Set(req.db_password.clone());
        active.db_name = Set(req.db_name.clone());
        active.db_sslmode = Set(req.db_sslmode.clone());
        active.ftp_host = Set(req.ftp_host.clone());
        active.ftp_port = Set(req.ftp_port.clone());
        active.ftp_user = Set(req.ftp_user.clone());
        active.ftp_password = Set(req.ftp_password.clone());
        active.ftp_private_key = Set(req.ftp_private_key.clone());
        active.ftp_path = Set(req.ftp_path.clone());
        active.ftp_passive = Set(req.ftp_passive);
        active.api_url = Set(req.api_url.clone());
        active.api_method = Set(req.api_method.clone());
        active.api_headers = Set(req.api_headers.clone());
        active.api_auth_type = Set(req.api_auth_type.clone());
        active.api_auth_key = Set(req.api_auth_key.clone());
        active.api_auth_value = Set(req.api_auth_value.clone());
        active.api_body = Set(req.api_body.clone());
        active.mongo_host = Set(req.mongo_host.clone());
        active.mongo_port = Set(req.mongo_port.clone());
        active.mongo_user = Set(req.mongo_user.clone());
        active.mongo_password = Set(req.mongo_password.clone());
        active.mongo_database = Set(req.mongo_database.clone());
        active.mongo_collection = Set(req.mongo_collection.clone());
        active.mongo_auth_db = Set(req.mongo_auth_db.clone());
        active.redis_host = Set(req.redis_host.clone());
        active.redis_port = Set(req.redis_port.clone());
        active.redis_password = Set(req.redis_password.clone());
        active.redis_db = Set(req.redis_db);
        active.redis_pattern = Set(req.redis_pattern.clone());
        active.updated_at = Set(Utc::now());

        let result = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update network: {}", e)))?;

        Ok(result)
    }

    /// Delete a network.
    pub async fn delete_network(&self, id: i64) -> AppResult<bool> {
        let result = Network::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete network: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    /// Record an agent's liveness: upsert the network row keyed by agent
    /// name, stamping status, last_seen, and the observed address.
    pub async fn upsert_agent_status(
        &self,
        agent_name: &str,
        status: NetworkStatus,
        ip_address: &str,
    ) -> AppResult<()> {
        let now = Utc::now();

        match self.find_network_by_name(agent_name).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.status = Set(status.as_str().to_string());
                active.last_seen = Set(Some(now));
                if !ip_address.is_empty() {
                    active.ip_address = Set(ip_address.to_string());
                }
                active.updated_at = Set(now);
                active
                    .update(self.connection())
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to update agent status: {}", e)))?;
            }
            None => {
                let model = ActiveModel {
                    name: Set(agent_name.to_string()),
                    ip_address: Set(ip_address.to_string()),
                    status: Set(status.as_str().to_string()),
                    last_seen: Set(Some(now)),
                    source_type: Set("database".to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                model
                    .insert(self.connection())
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to insert agent network: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Mark a network offline by agent name (on session loss).
    pub async fn mark_agent_offline(&self, agent_name: &str) -> AppResult<()> {
        if let Some(existing) = self.find_network_by_name(agent_name).await? {
            let mut active: ActiveModel = existing.into();
            active.status = Set(NetworkStatus::Offline.as_str().to_string());
            active.updated_at = Set(Utc::now());
            active
                .update(self.connection())
                .await
                .map_err(|e| AppError::Database(format!("Failed to mark agent offline: {}", e)))?;
        }
        Ok(())
    }
}
