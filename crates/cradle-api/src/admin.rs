use std::path::Path;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use cradle_store::CollectionPath;
use cradle_types::api::TestStoreResponse;

use crate::auth::AppState;

/// Collection read by `GET /admin/test-store`.
pub const TEST_COLLECTION: &str = "test";

/// The local service credential file. Loading one switches the admin routes
/// on; callers still authenticate with their JWT and the key stays on the
/// server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    pub private_key: String,
}

impl ServiceAccount {
    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let account: ServiceAccount = serde_json::from_str(&text)?;
        if account.private_key.trim().is_empty() {
            anyhow::bail!("service account {} has an empty private_key", path.display());
        }
        info!(
            project_id = account.project_id.as_deref().unwrap_or("-"),
            "Loaded service account"
        );
        Ok(Some(account))
    }
}

/// Read the whole `test` collection. Store failures are reported in the
/// body rather than as an HTTP error.
pub async fn test_store(State(state): State<AppState>) -> Json<TestStoreResponse> {
    let result = match CollectionPath::new(TEST_COLLECTION) {
        Ok(collection) => state.store.list(&collection).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(docs) => Json(TestStoreResponse {
            success: true,
            data: Some(docs.into_iter().map(|d| Value::Object(d.fields)).collect()),
            error: None,
        }),
        Err(e) => {
            error!("Test store read failed: {}", e);
            Json(TestStoreResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServiceAccount::load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn loads_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service-account.json");
        std::fs::write(
            &path,
            r#"{"type":"service_account","project_id":"cradle-dev","private_key":"k-123"}"#,
        )
        .unwrap();

        let account = ServiceAccount::load(&path).unwrap().unwrap();
        assert_eq!(account.private_key, "k-123");
        assert_eq!(account.project_id.as_deref(), Some("cradle-dev"));
    }

    #[test]
    fn rejects_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service-account.json");
        std::fs::write(&path, r#"{"private_key":"  "}"#).unwrap();
        assert!(ServiceAccount::load(&path).is_err());
    }
}
