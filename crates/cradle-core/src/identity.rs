use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use cradle_store::{CollectionPath, DocumentStore, Fields, SetMode};
use cradle_types::models::User;

use crate::{CoreError, CoreResult, USERS};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email already registered")]
    EmailTaken,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("identity provider error: {0}")]
    Internal(String),
}

/// The authority on who a user is. Cradle never checks passwords itself;
/// it asks a provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpProfile {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Write the `users/{uid}` profile document that accompanies every account.
pub async fn record_profile(store: &dyn DocumentStore, user: &User) -> CoreResult<()> {
    let path = CollectionPath::new(USERS)?.doc(user.id.to_string())?;

    let mut fields = Fields::new();
    fields.insert("name".to_string(), user.name.clone().into());
    fields.insert("email".to_string(), user.email.clone().into());
    fields.insert(
        "createdAt".to_string(),
        user.created_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .into(),
    );

    store.set(&path, fields, SetMode::Replace).await?;
    Ok(())
}

/// JSON file remembering the signed-in user between runs.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CoreResult<Option<User>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let user = serde_json::from_str(&text).map_err(|source| CoreError::Decode {
            what: format!("session file {}", self.path.display()),
            source,
        })?;
        Ok(Some(user))
    }

    pub fn save(&self, user: &User) -> CoreResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let text = serde_json::to_string_pretty(user).map_err(|source| CoreError::Decode {
            what: "session user".to_string(),
            source,
        })?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn clear(&self) -> CoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Client-side view of identity: delegates to a provider, records the user
/// profile document on sign-up and keeps the current user in a session file.
pub struct IdentityAdapter<P> {
    provider: P,
    store: Arc<dyn DocumentStore>,
    session: SessionFile,
    current: RwLock<Option<User>>,
}

impl<P: IdentityProvider> IdentityAdapter<P> {
    /// Restores any user persisted by a previous run.
    pub fn new(provider: P, store: Arc<dyn DocumentStore>, session: SessionFile) -> CoreResult<Self> {
        let current = session.load()?;
        if let Some(user) = &current {
            info!(user_id = %user.id, "Restored session");
        }
        Ok(Self {
            provider,
            store,
            session,
            current: RwLock::new(current),
        })
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn remember(&self, user: Option<User>) -> CoreResult<()> {
        match &user {
            Some(user) => self.session.save(user)?,
            None => self.session.clear()?,
        }
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = user;
        Ok(())
    }

    pub async fn sign_up(&self, profile: &SignUpProfile) -> CoreResult<User> {
        let user = self
            .provider
            .sign_up(&profile.email, &profile.password, &profile.name)
            .await?;
        record_profile(self.store.as_ref(), &user).await?;
        self.remember(Some(user.clone()))?;
        info!(user_id = %user.id, "Signed up");
        Ok(user)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> CoreResult<User> {
        let user = self
            .provider
            .sign_in(&credentials.email, &credentials.password)
            .await?;
        self.remember(Some(user.clone()))?;
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    pub async fn sign_out(&self) -> CoreResult<()> {
        self.provider.sign_out().await?;
        self.remember(None)?;
        info!("Signed out");
        Ok(())
    }
}
