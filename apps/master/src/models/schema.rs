//! Schema (extraction specification) DTOs.

use serde::{Deserialize, Serialize};

/// How the schema extracts: a SQL-ish query against the source, or a
/// fetched file decoded by the parsing hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSourceType {
    Query,
    File,
}

impl SchemaSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

impl Default for SchemaSourceType {
    fn default() -> Self {
        Self::Query
    }
}

/// Create/update payload for a schema.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertSchemaRequest {
    pub name: String,
    #[serde(default)]
    pub source_type: SchemaSourceType,
    #[serde(default)]
    pub sql_command: String,
    pub target_table: String,
    /// Drives upsert vs insert-ignore on the sink. Must name a column
    /// carrying a UNIQUE constraint managed by the operator.
    #[serde(default)]
    pub unique_key_column: String,
    #[serde(default)]
    pub description: String,

    // file-parsing hints
    #[serde(default)]
    pub file_format: String,
    #[serde(default)]
    pub file_pattern: String,
    #[serde(default = "default_has_header")]
    pub has_header: bool,
    #[serde(default)]
    pub delimiter: String,
}

fn default_has_header() -> bool {
    true
}
