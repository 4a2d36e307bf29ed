use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use cradle_store::{
    CollectionPath, Document, DocumentStore, SetMode, SnapshotCallback, SubscriptionHandle,
    to_fields,
};
use cradle_types::logs::{
    BottleFeeding, BowelMovement, BowelMovementPatch, Breastfeeding, LogEntry, LogPayload,
    Sickness, Sleep, SleepPatch, SolidFeeding,
};
use cradle_types::models::Category;

use crate::{CHILDREN, CoreResult, now_timestamp};

/// What a merge update does with the stored `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Keep it unless the caller sends a new one.
    #[default]
    Preserve,
    /// Stamp the current time on every update.
    Refresh,
}

/// Per-category [`TimestampPolicy`] table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampPolicies {
    policies: [TimestampPolicy; 6],
}

impl TimestampPolicies {
    /// `Refresh` for the given categories, `Preserve` for the rest.
    pub fn refreshing(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut policies = Self::default();
        for category in categories {
            policies.policies[category.index()] = TimestampPolicy::Refresh;
        }
        policies
    }

    pub fn get(&self, category: Category) -> TimestampPolicy {
        self.policies[category.index()]
    }
}

/// `children/{child_id}/{collection}` for a category.
pub fn log_collection(child_id: &str, category: Category) -> CoreResult<CollectionPath> {
    let child = CollectionPath::new(CHILDREN)?.doc(child_id)?;
    Ok(child.sub_collection(category.collection())?)
}

/// `id` and `timestamp` belong to the entry, so they are taken out before
/// the rest decodes into the payload and its `extra` map.
fn decode_entry<P: LogPayload>(doc: &Document) -> Result<LogEntry<P>, serde_json::Error> {
    let mut fields = doc.fields.clone();
    fields.remove("id");
    let timestamp = match fields.remove("timestamp") {
        Some(Value::String(ts)) => ts,
        _ => String::new(),
    };
    Ok(LogEntry {
        id: doc.id.clone(),
        timestamp,
        payload: serde_json::from_value(Value::Object(fields))?,
    })
}

/// Decode a snapshot, skipping documents that do not match the payload shape.
pub fn decode_entries<P: LogPayload>(docs: &[Document]) -> Vec<LogEntry<P>> {
    docs.iter()
        .filter_map(|doc| match decode_entry::<P>(doc) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(category = %P::CATEGORY, entry_id = %doc.id, "Skipping malformed log entry: {}", e);
                None
            }
        })
        .collect()
}

/// Add / update / delete / subscribe for one log category.
#[derive(Clone)]
pub struct LogRepository<P> {
    store: Arc<dyn DocumentStore>,
    policy: TimestampPolicy,
    _payload: PhantomData<fn() -> P>,
}

impl<P: LogPayload> LogRepository<P> {
    pub fn new(store: Arc<dyn DocumentStore>, policy: TimestampPolicy) -> Self {
        Self {
            store,
            policy,
            _payload: PhantomData,
        }
    }

    pub fn category(&self) -> Category {
        P::CATEGORY
    }

    pub fn policy(&self) -> TimestampPolicy {
        self.policy
    }

    /// Create an entry and return its id. Without an explicit `timestamp`
    /// the current time is stamped.
    pub async fn add(&self, child_id: &str, payload: &P, timestamp: Option<&str>) -> CoreResult<String> {
        let collection = log_collection(child_id, P::CATEGORY)?;

        let mut fields = to_fields(payload)?;
        let timestamp = timestamp.map(str::to_string).unwrap_or_else(now_timestamp);
        fields.insert("timestamp".to_string(), timestamp.into());

        let id = self.store.add(&collection, fields).await?;
        debug!(category = %P::CATEGORY, child_id, entry_id = %id, "Log entry added");
        Ok(id)
    }

    /// Merge `patch` into an entry. Fields left out of the patch keep their
    /// stored values.
    pub async fn update(
        &self,
        child_id: &str,
        entry_id: &str,
        patch: &P::Patch,
        timestamp: Option<&str>,
    ) -> CoreResult<()> {
        let document = log_collection(child_id, P::CATEGORY)?.doc(entry_id)?;

        let mut fields = to_fields(patch)?;
        match (timestamp, self.policy) {
            (Some(ts), _) => {
                fields.insert("timestamp".to_string(), ts.into());
            }
            (None, TimestampPolicy::Refresh) => {
                fields.insert("timestamp".to_string(), now_timestamp().into());
            }
            (None, TimestampPolicy::Preserve) => {}
        }

        self.store.set(&document, fields, SetMode::Merge).await?;
        debug!(category = %P::CATEGORY, child_id, entry_id, "Log entry updated");
        Ok(())
    }

    pub async fn delete(&self, child_id: &str, entry_id: &str) -> CoreResult<()> {
        let document = log_collection(child_id, P::CATEGORY)?.doc(entry_id)?;
        self.store.delete(&document).await?;
        debug!(category = %P::CATEGORY, child_id, entry_id, "Log entry deleted");
        Ok(())
    }

    pub async fn list(&self, child_id: &str) -> CoreResult<Vec<LogEntry<P>>> {
        let collection = log_collection(child_id, P::CATEGORY)?;
        let docs = self.store.list(&collection).await?;
        Ok(decode_entries(&docs))
    }

    /// Live view of the category for one child. `on_change` runs once before
    /// this returns and again after every change.
    pub async fn subscribe<F>(&self, child_id: &str, on_change: F) -> CoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<LogEntry<P>>) + Send + Sync + 'static,
    {
        let collection = log_collection(child_id, P::CATEGORY)?;
        let callback: SnapshotCallback = Arc::new(move |docs| on_change(decode_entries(&docs)));
        Ok(self.store.subscribe(&collection, callback).await?)
    }
}

/// One repository per category, sharing a store.
#[derive(Clone)]
pub struct LogBook {
    pub bowel_movements: LogRepository<BowelMovement>,
    pub sleep: LogRepository<Sleep>,
    pub bottle: LogRepository<BottleFeeding>,
    pub breastfeeding: LogRepository<Breastfeeding>,
    pub solid_feeding: LogRepository<SolidFeeding>,
    pub sickness: LogRepository<Sickness>,
}

impl LogBook {
    pub fn new(store: Arc<dyn DocumentStore>, policies: &TimestampPolicies) -> Self {
        Self {
            bowel_movements: LogRepository::new(store.clone(), policies.get(Category::BowelMovement)),
            sleep: LogRepository::new(store.clone(), policies.get(Category::Sleep)),
            bottle: LogRepository::new(store.clone(), policies.get(Category::Bottle)),
            breastfeeding: LogRepository::new(store.clone(), policies.get(Category::Breastfeeding)),
            solid_feeding: LogRepository::new(store.clone(), policies.get(Category::SolidFood)),
            sickness: LogRepository::new(store, policies.get(Category::Sickness)),
        }
    }

    // -- Bowel movements --

    pub async fn add_bowel_movement_with_time(
        &self,
        child_id: &str,
        movement_type: &str,
        time_of_day: &str,
    ) -> CoreResult<String> {
        let movement = BowelMovement::new(movement_type, time_of_day);
        self.bowel_movements.add(child_id, &movement, None).await
    }

    pub async fn update_bowel_movement_with_time(
        &self,
        child_id: &str,
        movement_id: &str,
        movement_type: &str,
        time_of_day: &str,
    ) -> CoreResult<()> {
        let patch = BowelMovementPatch {
            movement_type: Some(movement_type.to_string()),
            time_of_day: Some(time_of_day.to_string()),
            ..Default::default()
        };
        self.bowel_movements.update(child_id, movement_id, &patch, None).await
    }

    pub async fn delete_bowel_movement(&self, child_id: &str, movement_id: &str) -> CoreResult<()> {
        self.bowel_movements.delete(child_id, movement_id).await
    }

    pub async fn listen_to_bowel_movements<F>(&self, child_id: &str, on_change: F) -> CoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<LogEntry<BowelMovement>>) + Send + Sync + 'static,
    {
        self.bowel_movements.subscribe(child_id, on_change).await
    }

    // -- Sleep --

    pub async fn add_sleep_log(&self, child_id: &str, from_time: &str, to_time: &str) -> CoreResult<String> {
        let sleep = Sleep::new(from_time, to_time);
        self.sleep.add(child_id, &sleep, None).await
    }

    pub async fn update_sleep_log(
        &self,
        child_id: &str,
        log_id: &str,
        from_time: &str,
        to_time: &str,
    ) -> CoreResult<()> {
        let patch = SleepPatch {
            from_time: Some(from_time.to_string()),
            to_time: Some(to_time.to_string()),
            ..Default::default()
        };
        self.sleep.update(child_id, log_id, &patch, None).await
    }

    pub async fn delete_sleep_log(&self, child_id: &str, log_id: &str) -> CoreResult<()> {
        self.sleep.delete(child_id, log_id).await
    }

    pub async fn listen_to_sleep_logs<F>(&self, child_id: &str, on_change: F) -> CoreResult<SubscriptionHandle>
    where
        F: Fn(Vec<LogEntry<Sleep>>) + Send + Sync + 'static,
    {
        self.sleep.subscribe(child_id, on_change).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cradle_store::SqliteStore;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn book(policies: TimestampPolicies) -> (LogBook, Arc<dyn DocumentStore>) {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::in_memory().unwrap());
        (LogBook::new(store.clone(), &policies), store)
    }

    async fn raw(store: &Arc<dyn DocumentStore>, child_id: &str, category: Category, id: &str) -> serde_json::Value {
        let path = log_collection(child_id, category).unwrap().doc(id).unwrap();
        store.get(&path).await.unwrap().unwrap().to_json()
    }

    #[tokio::test]
    async fn add_then_subscribe_yields_the_entry() {
        let (logs, _) = book(TimestampPolicies::default());
        let id = logs.add_bowel_movement_with_time("c1", "solid", "morning").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = logs
            .listen_to_bowel_movements("c1", move |entries| {
                let _ = tx.send(entries);
            })
            .await
            .unwrap();

        let entries = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].payload.movement_type, "solid");
        assert_eq!(entries[0].payload.time_of_day, "morning");
        assert!(chrono::DateTime::parse_from_rfc3339(&entries[0].timestamp).is_ok());
    }

    #[tokio::test]
    async fn update_with_time_replaces_only_the_payload_fields() {
        let (logs, store) = book(TimestampPolicies::default());
        let id = logs.add_bowel_movement_with_time("c1", "solid", "morning").await.unwrap();
        let before = raw(&store, "c1", Category::BowelMovement, &id).await;

        logs.update_bowel_movement_with_time("c1", &id, "liquid", "evening").await.unwrap();

        let after = raw(&store, "c1", Category::BowelMovement, &id).await;
        assert_eq!(
            after,
            json!({
                "id": id,
                "movementType": "liquid",
                "timeOfDay": "evening",
                "timestamp": before["timestamp"],
            })
        );
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let (logs, _) = book(TimestampPolicies::default());
        let feeding = BottleFeeding {
            volume: Some(120),
            time_of_day: Some("night".into()),
            baby_burp: Some(true),
            ..Default::default()
        };
        let id = logs.bottle.add("c1", &feeding, Some("2026-10-01T02:00:00.000Z")).await.unwrap();

        let patch = BottleFeeding {
            volume: Some(150),
            ..Default::default()
        };
        logs.bottle.update("c1", &id, &patch, None).await.unwrap();

        let entries = logs.bottle.list("c1").await.unwrap();
        assert_eq!(entries[0].payload.volume, Some(150));
        assert_eq!(entries[0].payload.time_of_day.as_deref(), Some("night"));
        assert_eq!(entries[0].payload.baby_burp, Some(true));
        assert_eq!(entries[0].timestamp, "2026-10-01T02:00:00.000Z");
    }

    #[tokio::test]
    async fn refresh_policy_restamps_on_update() {
        let (logs, _) = book(TimestampPolicies::refreshing([Category::Sickness]));
        let sickness = Sickness {
            description: Some("fever".into()),
            ..Default::default()
        };
        let old = "2020-01-01T00:00:00.000Z";
        let id = logs.sickness.add("c1", &sickness, Some(old)).await.unwrap();

        let patch = Sickness {
            temperature: Some(38.5),
            ..Default::default()
        };
        logs.sickness.update("c1", &id, &patch, None).await.unwrap();

        let entries = logs.sickness.list("c1").await.unwrap();
        assert_ne!(entries[0].timestamp, old);
        assert_eq!(entries[0].payload.description.as_deref(), Some("fever"));
        assert_eq!(logs.sleep.policy(), TimestampPolicy::Preserve);
    }

    async fn assert_roundtrip<P>(repo: &LogRepository<P>, sent: serde_json::Value)
    where
        P: LogPayload + PartialEq + std::fmt::Debug,
    {
        let payload: P = serde_json::from_value(sent.clone()).unwrap();
        let id = repo.add("c1", &payload, Some("2026-10-15T08:00:00.000Z")).await.unwrap();

        let entries = repo.list("c1").await.unwrap();
        assert_eq!(entries.len(), 1, "{}", P::CATEGORY);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].timestamp, "2026-10-15T08:00:00.000Z");
        assert_eq!(entries[0].payload, payload);
        assert_eq!(serde_json::to_value(&entries[0].payload).unwrap(), sent);
    }

    #[tokio::test]
    async fn every_category_keeps_unknown_fields() {
        let (logs, _) = book(TimestampPolicies::default());
        assert_roundtrip(
            &logs.bowel_movements,
            json!({"movementType": "solid", "timeOfDay": "morning", "color": "green"}),
        )
        .await;
        assert_roundtrip(
            &logs.sleep,
            json!({"fromTime": "20:00", "toTime": "06:00", "wakeUps": 2}),
        )
        .await;
        assert_roundtrip(
            &logs.bottle,
            json!({"volume": 90, "babyBurp": true, "formula": "oat", "notes": "slow"}),
        )
        .await;
        assert_roundtrip(
            &logs.breastfeeding,
            json!({"side": "left", "leftMinutes": 10, "notes": "fussy"}),
        )
        .await;
        assert_roundtrip(
            &logs.solid_feeding,
            json!({"food": "carrot", "amount": "2 spoons", "texture": {"mashed": true}}),
        )
        .await;
        assert_roundtrip(
            &logs.sickness,
            json!({"description": "fever", "temperature": 38.5, "doctorVisited": false}),
        )
        .await;
    }

    #[tokio::test]
    async fn update_merges_unknown_fields() {
        let (logs, store) = book(TimestampPolicies::default());
        let sent = json!({"movementType": "solid", "timeOfDay": "morning", "color": "green"});
        let movement: BowelMovement = serde_json::from_value(sent).unwrap();
        let id = logs.bowel_movements.add("c1", &movement, None).await.unwrap();

        let patch: BowelMovementPatch = serde_json::from_value(json!({"notes": "after bath"})).unwrap();
        logs.bowel_movements.update("c1", &id, &patch, None).await.unwrap();

        let stored = raw(&store, "c1", Category::BowelMovement, &id).await;
        assert_eq!(stored["color"], "green");
        assert_eq!(stored["notes"], "after bath");
        assert_eq!(stored["movementType"], "solid");

        let entries = logs.bowel_movements.list("c1").await.unwrap();
        assert_eq!(entries[0].payload.extra.len(), 2);
        assert!(!entries[0].payload.extra.contains_key("timestamp"));
        assert!(!entries[0].payload.extra.contains_key("id"));
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_missing_entries() {
        let (logs, _) = book(TimestampPolicies::default());
        let id = logs.add_sleep_log("c1", "20:00", "06:00").await.unwrap();

        logs.delete_sleep_log("c1", &id).await.unwrap();
        logs.delete_sleep_log("c1", &id).await.unwrap();
        logs.delete_sleep_log("c1", "never-existed").await.unwrap();

        assert!(logs.sleep.list("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped() {
        let (logs, store) = book(TimestampPolicies::default());
        logs.add_sleep_log("c1", "20:00", "06:00").await.unwrap();

        let collection = log_collection("c1", Category::Sleep).unwrap();
        let mut junk = serde_json::Map::new();
        junk.insert("fromTime".into(), json!(42));
        store.add(&collection, junk).await.unwrap();

        assert_eq!(logs.sleep.list("c1").await.unwrap().len(), 1);
    }

    #[test]
    fn log_collection_paths() {
        let path = log_collection("c1", Category::SolidFood).unwrap();
        assert_eq!(path.as_str(), "children/c1/solidfeeding");
        assert!(log_collection("a/b", Category::Sleep).is_err());
    }
}
