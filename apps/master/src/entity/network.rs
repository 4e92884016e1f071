//! Network entity: a source endpoint and its owning agent.

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "networks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique; the default command-routing key.
    pub name: String,
    /// Optional routing override for agents serving several networks.
    pub agent_name: String,
    pub ip_address: String,
    /// online | offline
    pub status: String,
    pub last_seen: Option<DateTimeUtc>,
    /// database | ftp | sftp | api | mongodb | redis
    pub source_type: String,

    // database block
    pub db_driver: String,
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    #[serde(skip_serializing)]
    pub db_password: String,
    pub db_name: String,
    pub db_sslmode: String,

    // ftp/sftp block
    pub ftp_host: String,
    pub ftp_port: String,
    pub ftp_user: String,
    #[serde(skip_serializing)]
    pub ftp_password: String,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub ftp_private_key: String,
    pub ftp_path: String,
    pub ftp_passive: bool,

    // api block
    pub api_url: String,
    pub api_method: String,
    #[sea_orm(column_type = "Text")]
    pub api_headers: String,
    pub api_auth_type: String,
    pub api_auth_key: String,
    #[serde(skip_serializing)]
    pub api_auth_value: String,
    #[sea_orm(column_type = "Text")]
    pub api_body: String,

    // mongodb block
    pub mongo_host: String,
    pub mongo_port: String,
    pub mongo_user: String,
    #[serde(skip_serializing)]
    pub mongo_password: String,
    pub mongo_database: String,
    pub mongo_collection: String,
    pub mongo_auth_db: String,

    // redis block
    pub redis_host: String,
    pub redis_port: String,
    #[serde(skip_serializing)]
    pub redis_password: String,
    pub redis_db: i64,
    pub redis_pattern: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// The key commands for this network are routed by.
    pub fn routing_name(&self) -> &str {
        if self.agent_name.is_empty() {
            &self.name
        } else {
            &self.agent_name
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job::Entity")]
    Jobs,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Jobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
