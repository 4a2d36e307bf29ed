use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::Document;

/// Receives the full, ordered contents of a collection on attach and after
/// every change.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Keeps a live subscription open.
///
/// `cancel` may be called any number of times. Dropping the handle cancels
/// the subscription as well.
#[derive(Debug)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
