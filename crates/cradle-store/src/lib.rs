//! Document store used by every Cradle component.
//!
//! Collections hold flat JSON documents. Besides the usual create / merge /
//! delete / query primitives the store offers live subscriptions that push
//! the whole collection to a callback whenever it changes.

pub mod error;
pub mod notifier;
pub mod path;
pub mod sqlite;
pub mod subscription;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::{StoreError, StoreResult};
pub use path::{CollectionPath, DocumentPath};
pub use sqlite::SqliteStore;
pub use subscription::{SnapshotCallback, SubscriptionHandle};

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// The fields with the document id added under `id`.
    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite the whole document.
    Replace,
    /// Only touch the supplied fields.
    Merge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }
}

/// Serialize a struct into a document field map.
pub fn to_fields<T: serde::Serialize>(value: &T) -> StoreResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt {
            path: String::new(),
            reason: format!("expected a JSON object, got {}", other),
        }),
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a generated id and return the id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String>;

    async fn set(&self, document: &DocumentPath, fields: Fields, mode: SetMode) -> StoreResult<()>;

    /// Remove a document. Removing a missing document succeeds.
    async fn delete(&self, document: &DocumentPath) -> StoreResult<()>;

    async fn get(&self, document: &DocumentPath) -> StoreResult<Option<Document>>;

    /// Whole collection in insertion order.
    async fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>>;

    async fn query(&self, collection: &CollectionPath, filter: Filter) -> StoreResult<Vec<Document>>;

    /// Deliver the current contents to `on_change` before returning, then
    /// again after every change until the handle is cancelled.
    async fn subscribe(
        &self,
        collection: &CollectionPath,
        on_change: SnapshotCallback,
    ) -> StoreResult<SubscriptionHandle>;
}
