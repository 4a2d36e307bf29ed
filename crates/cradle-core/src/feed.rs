use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, warn};

use cradle_store::SubscriptionHandle;
use cradle_types::feed::{FeedCategory, FeedItem, FeedingKind};
use cradle_types::logs::{LogEntry, LogPayload};
use cradle_types::models::Category;

use crate::CoreResult;
use crate::logs::{LogBook, LogRepository};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Called with a category's freshly mapped slot once it has been merged
/// into the view.
pub type CategoryCallback = Arc<dyn Fn(Category, &[FeedItem]) + Send + Sync>;

pub type FeedView = Arc<Vec<FeedItem>>;

fn parse_timestamp(timestamp: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(timestamp).ok()
}

/// Project a log entry to a feed row. An unparseable timestamp is logged
/// and yields an empty display date.
pub fn to_feed_item<P: LogPayload>(category: Category, entry: &LogEntry<P>) -> FeedItem {
    let display_date = match parse_timestamp(&entry.timestamp) {
        Some(ts) => ts.format(DISPLAY_FORMAT).to_string(),
        None => {
            error!(
                category = %category,
                entry_id = %entry.id,
                "Invalid timestamp '{}' on log entry",
                entry.timestamp
            );
            String::new()
        }
    };

    let data = serde_json::to_value(&entry.payload).unwrap_or_else(|e| {
        warn!(entry_id = %entry.id, "Could not serialize payload: {}", e);
        Value::Null
    });

    FeedItem {
        id: entry.id.clone(),
        category: FeedCategory::from(category),
        sub_category: FeedingKind::of(category),
        display_date,
        timestamp: entry.timestamp.clone(),
        data,
    }
}

/// Concatenate the slots in category order and sort ascending by time.
///
/// The sort is stable. Items whose timestamp does not parse go after every
/// item that does, in concatenation order.
pub fn aggregate(slots: &[Vec<FeedItem>]) -> Vec<FeedItem> {
    let mut keyed: Vec<(Option<DateTime<FixedOffset>>, &FeedItem)> = slots
        .iter()
        .flatten()
        .map(|item| (parse_timestamp(&item.timestamp), item))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

/// One-shot aggregated view, read without subscribing.
pub async fn feed_snapshot(logs: &LogBook, child_id: &str) -> CoreResult<Vec<FeedItem>> {
    let mut slots: Vec<Vec<FeedItem>> = vec![Vec::new(); Category::ALL.len()];
    slots[Category::BowelMovement.index()] = map_entries(logs.bowel_movements.list(child_id).await?);
    slots[Category::Sleep.index()] = map_entries(logs.sleep.list(child_id).await?);
    slots[Category::Bottle.index()] = map_entries(logs.bottle.list(child_id).await?);
    slots[Category::Breastfeeding.index()] = map_entries(logs.breastfeeding.list(child_id).await?);
    slots[Category::SolidFood.index()] = map_entries(logs.solid_feeding.list(child_id).await?);
    slots[Category::Sickness.index()] = map_entries(logs.sickness.list(child_id).await?);
    Ok(aggregate(&slots))
}

fn map_entries<P: LogPayload>(entries: Vec<LogEntry<P>>) -> Vec<FeedItem> {
    entries.iter().map(|e| to_feed_item(P::CATEGORY, e)).collect()
}

#[derive(Default)]
struct FeedState {
    child_id: Option<String>,
    /// Bumped on every start/stop so callbacks from older subscriptions
    /// cannot write into the current slots.
    generation: u64,
    slots: [Vec<FeedItem>; 6],
    handles: Vec<SubscriptionHandle>,
}

/// Keeps the merged, time-ordered feed of one child up to date by holding
/// a live subscription on each of the six log categories.
pub struct FeedAggregator {
    logs: LogBook,
    state: Arc<Mutex<FeedState>>,
    view_tx: Arc<watch::Sender<FeedView>>,
    on_category: Option<CategoryCallback>,
}

impl FeedAggregator {
    pub fn new(logs: LogBook) -> Self {
        let (view_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            logs,
            state: Arc::new(Mutex::new(FeedState::default())),
            view_tx: Arc::new(view_tx),
            on_category: None,
        }
    }

    pub fn with_category_callback(mut self, callback: CategoryCallback) -> Self {
        self.on_category = Some(callback);
        self
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start following `child_id`. Subscriptions from a previous start are
    /// cancelled first and the slots are cleared. If any category fails to
    /// subscribe the aggregator ends up stopped.
    pub async fn start(&self, child_id: &str) -> CoreResult<()> {
        let generation = {
            let mut state = self.lock();
            self.reset(&mut state);
            state.child_id = Some(child_id.to_string());
            state.generation
        };

        // Opened without holding the lock: every subscribe delivers its first
        // snapshot synchronously, and that callback takes the lock.
        let opened = self.open_all(child_id, generation).await;

        let mut state = self.lock();
        if state.generation != generation {
            // Restarted or stopped while subscribing; dropping the handles
            // cancels them.
            return opened.map(|_| ());
        }
        match opened {
            Ok(handles) => {
                state.handles = handles;
                info!(child_id, "Feed aggregation started");
                Ok(())
            }
            Err(e) => {
                warn!(child_id, "Feed aggregation failed to start: {}", e);
                self.reset(&mut state);
                state.child_id = None;
                Err(e)
            }
        }
    }

    async fn open_all(&self, child_id: &str, generation: u64) -> CoreResult<Vec<SubscriptionHandle>> {
        Ok(vec![
            self.open(&self.logs.bowel_movements, child_id, generation).await?,
            self.open(&self.logs.sleep, child_id, generation).await?,
            self.open(&self.logs.bottle, child_id, generation).await?,
            self.open(&self.logs.breastfeeding, child_id, generation).await?,
            self.open(&self.logs.solid_feeding, child_id, generation).await?,
            self.open(&self.logs.sickness, child_id, generation).await?,
        ])
    }

    /// Cancel all subscriptions and clear the view. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.lock();
        self.reset(&mut state);
        if let Some(child_id) = state.child_id.take() {
            info!(child_id = %child_id, "Feed aggregation stopped");
        }
    }

    /// Cancel the handles, invalidate pending callbacks and publish an empty
    /// view. `child_id` is left to the caller.
    fn reset(&self, state: &mut FeedState) {
        for handle in state.handles.drain(..) {
            handle.cancel();
        }
        state.generation += 1;
        state.slots = Default::default();
        self.view_tx.send_replace(Arc::new(Vec::new()));
    }

    pub fn child_id(&self) -> Option<String> {
        self.lock().child_id.clone()
    }

    /// The current merged view.
    pub fn view(&self) -> FeedView {
        self.view_tx.borrow().clone()
    }

    /// Receiver notified whenever the merged view is replaced.
    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view_tx.subscribe()
    }

    async fn open<P: LogPayload>(
        &self,
        repo: &LogRepository<P>,
        child_id: &str,
        generation: u64,
    ) -> CoreResult<SubscriptionHandle> {
        let state = self.state.clone();
        let view_tx = self.view_tx.clone();
        let on_category = self.on_category.clone();
        let category = P::CATEGORY;

        repo.subscribe(child_id, move |entries: Vec<LogEntry<P>>| {
            let items: Vec<FeedItem> = entries.iter().map(|e| to_feed_item(category, e)).collect();

            {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if state.generation != generation {
                    return;
                }
                state.slots[category.index()] = items.clone();
                // Recomputed and published under the lock so readers never
                // observe a half-updated view.
                view_tx.send_replace(Arc::new(aggregate(&state.slots)));
            }

            if let Some(callback) = &on_category {
                callback(category, &items);
            }
        })
        .await
    }
}

impl Drop for FeedAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}
