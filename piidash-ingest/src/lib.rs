//! Ingest boundary: fetch raw user records, normalize and enrich them, and
//! commit the result to the entity store in one replacement.

use std::path::PathBuf;

use async_trait::async_trait;
use piidash_store::UserEntityStore;
use piidash_types::normalize::users_from_values;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

pub mod http;
pub use http::HttpUserSource;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("http error: {0}")]
    Http(String),
    #[error("http status: {0}")]
    Status(u16),
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("expected a JSON array of users, got {0}")]
    Shape(&'static str),
}

/// Where raw user records come from.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Raw records, in the backend's order.
    async fn fetch(&self) -> Result<Vec<Value>, IngestError>;

    fn describe(&self) -> String;
}

/// Records already in memory.
pub struct StaticUserSource {
    records: Vec<Value>,
}

impl StaticUserSource {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl UserSource for StaticUserSource {
    async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory records", self.records.len())
    }
}

/// A JSON file holding the same array the users endpoint returns.
pub struct JsonFileUserSource {
    path: PathBuf,
}

impl JsonFileUserSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UserSource for JsonFileUserSource {
    async fn fetch(&self) -> Result<Vec<Value>, IngestError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| IngestError::Io(format!("{}: {e}", self.path.display())))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| IngestError::Parse(e.to_string()))?;
        records_from_payload(value)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub(crate) fn records_from_payload(value: Value) -> Result<Vec<Value>, IngestError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Err(IngestError::Shape("an object")),
        Value::String(_) => Err(IngestError::Shape("a string")),
        Value::Number(_) => Err(IngestError::Shape("a number")),
        Value::Bool(_) => Err(IngestError::Shape("a boolean")),
        Value::Null => Err(IngestError::Shape("null")),
    }
}

/// Fetch from `source` and replace the store's collection with the enriched
/// records. Returns the number of users committed.
///
/// On a fetch error the store is left untouched.
pub async fn load_users(
    source: &dyn UserSource,
    store: &UserEntityStore,
) -> Result<usize, IngestError> {
    let raw = source.fetch().await?;
    let users = users_from_values(&raw);
    let committed = users.len();
    info!(
        source = %source.describe(),
        fetched = raw.len(),
        committed,
        "loaded users"
    );
    store.set_all(users);
    Ok(committed)
}
