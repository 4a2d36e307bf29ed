use std::sync::Arc;

use tracing::{debug, warn};

use cradle_store::{CollectionPath, Document, DocumentStore, Filter, to_fields};
use cradle_types::models::{Child, ChildProfile};

use crate::{CHILDREN, CoreError, CoreResult, now_timestamp};

fn decode_child(doc: &Document) -> CoreResult<Child> {
    serde_json::from_value(doc.to_json()).map_err(|source| CoreError::Decode {
        what: format!("child {}", doc.id),
        source,
    })
}

/// Creates and looks up child profiles in the top-level `children`
/// collection.
#[derive(Clone)]
pub struct ChildRegistry {
    store: Arc<dyn DocumentStore>,
}

impl ChildRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection() -> CoreResult<CollectionPath> {
        Ok(CollectionPath::new(CHILDREN)?)
    }

    /// Register a child for `user_id` and return the generated id.
    pub async fn create(&self, user_id: &str, profile: &ChildProfile) -> CoreResult<String> {
        let mut fields = to_fields(profile)?;
        fields.insert("userId".to_string(), user_id.into());
        fields.insert("createdAt".to_string(), now_timestamp().into());

        let id = self.store.add(&Self::collection()?, fields).await?;
        debug!(user_id, child_id = %id, "Child registered");
        Ok(id)
    }

    /// Children owned by `user_id`, in the order the store returns them.
    /// Documents that do not decode as a child are skipped.
    pub async fn list_for_owner(&self, user_id: &str) -> CoreResult<Vec<Child>> {
        let docs = self
            .store
            .query(&Self::collection()?, Filter::eq("userId", user_id))
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match decode_child(doc) {
                Ok(child) => Some(child),
                Err(e) => {
                    warn!("Skipping child document: {}", e);
                    None
                }
            })
            .collect())
    }

    pub async fn get(&self, child_id: &str) -> CoreResult<Option<Child>> {
        let path = Self::collection()?.doc(child_id)?;
        match self.store.get(&path).await? {
            Some(doc) => Ok(Some(decode_child(&doc)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cradle_store::SqliteStore;

    fn registry() -> ChildRegistry {
        ChildRegistry::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn profile(name: &str) -> ChildProfile {
        ChildProfile {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lists_only_the_owners_children() {
        let children = registry();
        let a = children.create("u1", &profile("Alva")).await.unwrap();
        children.create("u2", &profile("Bo")).await.unwrap();
        let c = children.create("u1", &profile("Cleo")).await.unwrap();

        let mine = children.list_for_owner("u1").await.unwrap();
        let ids: Vec<&str> = mine.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), c.as_str()]);
        assert!(mine.iter().all(|c| c.user_id == "u1"));
        assert_eq!(mine[0].profile.name, "Alva");

        assert!(children.list_for_owner("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn extra_profile_fields_survive() {
        let children = registry();
        let mut p = profile("Alva");
        p.birth_date = Some("2026-03-01".into());
        p.extra.insert("gender".into(), "girl".into());
        let id = children.create("u1", &p).await.unwrap();

        let child = children.get(&id).await.unwrap().unwrap();
        assert_eq!(child.profile, p);
        assert!(chrono::DateTime::parse_from_rfc3339(&child.created_at).is_ok());
        assert!(children.get("missing").await.unwrap().is_none());
    }
}
