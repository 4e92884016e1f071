//! MongoDB source adapter: `find` over the configured collection.

use std::time::Duration;

use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::Client;
use tracing::info;

use datalink_wire::{MongoConfig, Record};

use crate::error::{AgentError, AgentResult};

use super::BatchEmitter;

/// Per-find server-side time limit.
const FIND_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(config: &MongoConfig, filter: &str, emitter: &BatchEmitter) -> AgentResult<()> {
    if config.host.is_empty() || config.database.is_empty() || config.collection.is_empty() {
        return Err(AgentError::Source(
            "mongodb config missing required fields (host, database, or collection)".into(),
        ));
    }

    let client = connect(config).await?;
    let collection = client
        .database(&config.database)
        .collection::<Document>(&config.collection);

    // empty or unparsable filter means all documents
    let filter_doc = parse_filter(filter);
    info!(
        collection = %config.collection,
        filter = %filter_doc,
        "executing mongodb find"
    );

    let options = FindOptions::builder().max_time(FIND_TIMEOUT).build();
    let mut cursor = collection
        .find(filter_doc)
        .with_options(options)
        .await
        .map_err(|e| AgentError::Source(format!("mongodb find failed: {}", e)))?;

    let mut records: Vec<Record> = Vec::new();
    while let Some(doc) = cursor
        .try_next()
        .await
        .map_err(|e| AgentError::Source(format!("mongodb cursor error: {}", e)))?
    {
        if let serde_json::Value::Object(map) = Bson::Document(doc).into_relaxed_extjson() {
            records.push(map);
        }
    }

    info!(total = records.len(), "mongodb extraction finished");
    emitter.emit(records).await
}

pub async fn connect(config: &MongoConfig) -> AgentResult<Client> {
    let port = if config.port.is_empty() {
        "27017"
    } else {
        &config.port
    };

    let uri = if !config.user.is_empty() && !config.password.is_empty() {
        let auth_db = if config.auth_db.is_empty() {
            "admin"
        } else {
            &config.auth_db
        };
        format!(
            "mongodb://{}:{}@{}:{}/{}?authSource={}",
            config.user, config.password, config.host, port, config.database, auth_db
        )
    } else {
        format!("mongodb://{}:{}", config.host, port)
    };

    let mut options = ClientOptions::parse(&uri)
        .await
        .map_err(|e| AgentError::Source(format!("invalid mongodb uri: {}", e)))?;
    options.connect_timeout = Some(Duration::from_secs(10));
    options.server_selection_timeout = Some(Duration::from_secs(10));

    Client::with_options(options).map_err(|e| AgentError::Source(e.to_string()))
}

fn parse_filter(filter: &str) -> Document {
    if filter.trim().is_empty() {
        return Document::new();
    }
    serde_json::from_str::<serde_json::Value>(filter)
        .ok()
        .and_then(|v| mongodb::bson::to_document(&v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_invalid_filters_select_everything() {
        assert!(parse_filter("").is_empty());
        assert!(parse_filter("   ").is_empty());
        assert!(parse_filter("not json").is_empty());
    }

    #[test]
    fn json_filters_become_documents() {
        let doc = parse_filter(r#"{"status": "active", "age": {"$gt": 30}}"#);
        assert_eq!(doc.get_str("status").unwrap(), "active");
        assert!(doc.get_document("age").is_ok());
    }
}
