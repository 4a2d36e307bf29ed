use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use cradle_db::Database;
use cradle_db::models::DocumentRow;

use crate::notifier::ChangeNotifier;
use crate::{
    CollectionPath, Document, DocumentPath, DocumentStore, Fields, Filter, SetMode,
    SnapshotCallback, StoreError, StoreResult, SubscriptionHandle,
};

/// [`DocumentStore`] on top of the SQLite `documents` table.
///
/// Cheap to clone; clones share the connection and the change notifier.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    notifier: ChangeNotifier,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(Database::open(path)?)))
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(Arc::new(Database::open_in_memory()?)))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db)).await?;
        Ok(result?)
    }
}

fn into_document(row: DocumentRow) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(&row.fields)? {
        Value::Object(fields) => Ok(Document { id: row.id, fields }),
        other => Err(StoreError::Corrupt {
            path: format!("{}/{}", row.collection, row.id),
            reason: format!("fields are not an object: {}", other),
        }),
    }
}

fn into_documents(rows: Vec<DocumentRow>) -> StoreResult<Vec<Document>> {
    rows.into_iter().map(into_document).collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let path = collection.doc(id.clone())?;

        let (c, i) = (collection.as_str().to_string(), id.clone());
        self.blocking(move |db| db.insert_document(&c, &i, &fields)).await?;

        debug!("Created {}", path);
        self.notifier.publish(collection);
        Ok(id)
    }

    async fn set(&self, document: &DocumentPath, fields: Fields, mode: SetMode) -> StoreResult<()> {
        let (c, i) = (document.collection().as_str().to_string(), document.id().to_string());
        match mode {
            SetMode::Replace => self.blocking(move |db| db.replace_document(&c, &i, &fields)).await?,
            SetMode::Merge => self.blocking(move |db| db.merge_document(&c, &i, &fields)).await?,
        }

        debug!("Wrote {} ({:?})", document, mode);
        self.notifier.publish(document.collection());
        Ok(())
    }

    async fn delete(&self, document: &DocumentPath) -> StoreResult<()> {
        let (c, i) = (document.collection().as_str().to_string(), document.id().to_string());
        let removed = self.blocking(move |db| db.delete_document(&c, &i)).await?;

        if removed {
            debug!("Deleted {}", document);
            self.notifier.publish(document.collection());
        }
        Ok(())
    }

    async fn get(&self, document: &DocumentPath) -> StoreResult<Option<Document>> {
        let (c, i) = (document.collection().as_str().to_string(), document.id().to_string());
        let row = self.blocking(move |db| db.get_document(&c, &i)).await?;
        row.map(into_document).transpose()
    }

    async fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>> {
        let c = collection.as_str().to_string();
        let rows = self.blocking(move |db| db.list_documents(&c)).await?;
        into_documents(rows)
    }

    async fn query(&self, collection: &CollectionPath, filter: Filter) -> StoreResult<Vec<Document>> {
        let c = collection.as_str().to_string();
        let rows = match filter {
            Filter::Eq(field, value) => {
                self.blocking(move |db| db.query_documents_eq(&c, &field, &value)).await?
            }
        };
        into_documents(rows)
    }

    async fn subscribe(
        &self,
        collection: &CollectionPath,
        on_change: SnapshotCallback,
    ) -> StoreResult<SubscriptionHandle> {
        // Listen before the first read so no change falls in between.
        let mut changes = self.notifier.subscribe();

        let initial = self.list(collection).await?;
        on_change(initial);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let store = self.clone();
        let path = collection.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    changed = changes.recv() => {
                        match changed {
                            Ok(changed) if changed == path => {}
                            Ok(_) => continue,
                            Err(RecvError::Lagged(n)) => {
                                warn!("Subscription on {} lagged by {} changes, resyncing", path, n);
                            }
                            Err(RecvError::Closed) => break,
                        }

                        match store.list(&path).await {
                            Ok(docs) => {
                                if cancelled.is_cancelled() {
                                    break;
                                }
                                on_change(docs);
                            }
                            Err(e) => error!("Failed to refresh subscription on {}: {}", path, e),
                        }
                    }
                }
            }
            debug!("Subscription on {} closed", path);
        });

        debug!("Subscribed to {}", collection);
        Ok(SubscriptionHandle::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn recorder() -> (SnapshotCallback, mpsc::UnboundedReceiver<Vec<Document>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SnapshotCallback = Arc::new(move |docs| {
            let _ = tx.send(docs);
        });
        (callback, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<Document>>) -> Vec<Document> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription dropped")
    }

    #[tokio::test]
    async fn add_then_get() {
        let store = SqliteStore::in_memory().unwrap();
        let sleep = CollectionPath::new("children/c1/sleep").unwrap();

        let id = store
            .add(&sleep, fields(json!({"fromTime": "20:00", "toTime": "06:00"})))
            .await
            .unwrap();

        let doc = store.get(&sleep.doc(id.clone()).unwrap()).await.unwrap().unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.get_str("fromTime"), Some("20:00"));
        assert_eq!(doc.to_json()["id"], json!(id));
    }

    #[tokio::test]
    async fn merge_and_replace() {
        let store = SqliteStore::in_memory().unwrap();
        let col = CollectionPath::new("sickness").unwrap();
        let id = store.add(&col, fields(json!({"description": "cold", "temperature": 38.2}))).await.unwrap();
        let path = col.doc(id).unwrap();

        store.set(&path, fields(json!({"medication": "none"})), SetMode::Merge).await.unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.fields.len(), 3);

        store.set(&path, fields(json!({"description": "flu"})), SetMode::Replace).await.unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({"description": "flu"})));
    }

    #[tokio::test]
    async fn delete_missing_document_succeeds() {
        let store = SqliteStore::in_memory().unwrap();
        let col = CollectionPath::new("bottle").unwrap();
        store.delete(&col.doc("nope").unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn query_by_equality() {
        let store = SqliteStore::in_memory().unwrap();
        let children = CollectionPath::new("children").unwrap();
        store.add(&children, fields(json!({"userId": "u1"}))).await.unwrap();
        store.add(&children, fields(json!({"userId": "u2"}))).await.unwrap();

        let found = store.query(&children, Filter::eq("userId", "u2")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("userId"), Some("u2"));
    }

    #[tokio::test]
    async fn subscription_sees_initial_state_and_changes() {
        let store = SqliteStore::in_memory().unwrap();
        let col = CollectionPath::new("children/c1/bowelMovements").unwrap();
        let first = store.add(&col, fields(json!({"movementType": "solid"}))).await.unwrap();

        let (callback, mut rx) = recorder();
        let _handle = store.subscribe(&col, callback).await.unwrap();

        let initial = next(&mut rx).await;
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].id, first);

        store.add(&col, fields(json!({"movementType": "liquid"}))).await.unwrap();
        assert_eq!(next(&mut rx).await.len(), 2);

        store.delete(&col.doc(first).unwrap()).await.unwrap();
        let after_delete = next(&mut rx).await;
        assert_eq!(after_delete.len(), 1);
        assert_eq!(after_delete[0].get_str("movementType"), Some("liquid"));
    }

    #[tokio::test]
    async fn subscription_ignores_other_collections() {
        let store = SqliteStore::in_memory().unwrap();
        let mine = CollectionPath::new("children/c1/sleep").unwrap();
        let other = CollectionPath::new("children/c2/sleep").unwrap();

        let (callback, mut rx) = recorder();
        let _handle = store.subscribe(&mine, callback).await.unwrap();
        assert!(next(&mut rx).await.is_empty());

        store.add(&other, fields(json!({}))).await.unwrap();
        store.add(&mine, fields(json!({}))).await.unwrap();

        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_delivering() {
        let store = SqliteStore::in_memory().unwrap();
        let col = CollectionPath::new("bottle").unwrap();

        let (callback, mut rx) = recorder();
        let handle = store.subscribe(&col, callback).await.unwrap();
        next(&mut rx).await;

        handle.cancel();
        handle.cancel();
        store.add(&col, fields(json!({"volume": 120}))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
