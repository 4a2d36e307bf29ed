use tokio::sync::broadcast;

use crate::path::CollectionPath;

/// Fans out "this collection changed" notices to every live subscription.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<CollectionPath>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionPath> {
        self.tx.subscribe()
    }

    /// Publish a change. Having no listeners is not an error.
    pub fn publish(&self, collection: &CollectionPath) {
        let _ = self.tx.send(collection.clone());
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
