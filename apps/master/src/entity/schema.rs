//! Schema entity: what to extract and where it lands.

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "schemas")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// query | file
    pub source_type: String,
    #[sea_orm(column_type = "Text")]
    pub sql_command: String,
    pub target_table: String,
    pub unique_key_column: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,

    // file-parsing hints
    pub file_format: String,
    pub file_pattern: String,
    pub has_header: bool,
    pub delimiter: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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
