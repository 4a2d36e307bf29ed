use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use async_trait::async_trait;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::error;
use uuid::Uuid;

use cradle_core::children::ChildRegistry;
use cradle_core::identity::{IdentityError, IdentityProvider, record_profile};
use cradle_core::logs::LogBook;
use cradle_db::Database;
use cradle_db::models::UserRow;
use cradle_store::DocumentStore;
use cradle_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use cradle_types::models::User;

use crate::admin::ServiceAccount;
use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub identity: PasswordIdentityProvider,
    pub store: Arc<dyn DocumentStore>,
    pub logs: LogBook,
    pub children: ChildRegistry,
    pub jwt_secret: String,
    /// `None` disables the admin routes.
    pub service_account: Option<ServiceAccount>,
}

/// Email/password accounts kept in the `users` table, hashed with Argon2id.
#[derive(Clone)]
pub struct PasswordIdentityProvider {
    db: Arc<Database>,
}

impl PasswordIdentityProvider {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, IdentityError>
    where
        F: FnOnce(&Database) -> Result<T, IdentityError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                IdentityError::Internal(e.to_string())
            })?
    }
}

/// Expects `email` and `name` already trimmed.
fn validate_sign_up(email: &str, password: &str, name: &str) -> Result<(), IdentityError> {
    if name.is_empty() || name.chars().count() > 64 {
        return Err(IdentityError::Validation("name must be 1-64 characters".into()));
    }
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(IdentityError::Validation("email is not valid".into()));
    }
    if password.len() < 8 {
        return Err(IdentityError::Validation("password must be at least 8 characters".into()));
    }
    Ok(())
}

fn user_from_row(row: UserRow) -> Result<User, IdentityError> {
    let id = row
        .id
        .parse::<Uuid>()
        .map_err(|e| IdentityError::Internal(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| IdentityError::Internal(e.to_string()))?;
    Ok(User {
        id,
        email: row.email,
        name: row.name,
        created_at,
    })
}

fn internal(e: anyhow::Error) -> IdentityError {
    IdentityError::Internal(e.to_string())
}

#[async_trait]
impl IdentityProvider for PasswordIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<User, IdentityError> {
        let (email, password, name) = (email.trim().to_string(), password.to_string(), name.trim().to_string());
        validate_sign_up(&email, &password, &name)?;

        self.blocking(move |db| {
            if db.get_user_by_email(&email).map_err(internal)?.is_some() {
                return Err(IdentityError::EmailTaken);
            }

            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| IdentityError::Internal(e.to_string()))?
                .to_string();

            // A concurrent sign-up can pass the lookup above; the UNIQUE
            // index on email settles it.
            let id = Uuid::new_v4();
            db.create_user(&id.to_string(), &email, &name, &password_hash)
                .map_err(|e| {
                    if cradle_db::is_unique_violation(&e) {
                        IdentityError::EmailTaken
                    } else {
                        internal(e)
                    }
                })?;

            let row = db
                .get_user_by_id(&id.to_string())
                .map_err(internal)?
                .ok_or_else(|| IdentityError::Internal("user vanished after insert".into()))?;
            user_from_row(row)
        })
        .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        let (email, password) = (email.trim().to_string(), password.to_string());
        self.blocking(move |db| {
            let row = db
                .get_user_by_email(&email)
                .map_err(internal)?
                .ok_or(IdentityError::InvalidCredentials)?;

            let parsed_hash =
                PasswordHash::new(&row.password).map_err(|e| IdentityError::Internal(e.to_string()))?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| IdentityError::InvalidCredentials)?;

            user_from_row(row)
        })
        .await
    }

    /// Tokens are stateless; there is nothing to revoke server-side.
    async fn sign_out(&self) -> Result<(), IdentityError> {
        Ok(())
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.identity.sign_up(&req.email, &req.password, &req.name).await?;
    record_profile(state.store.as_ref(), &user).await?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.identity.sign_in(&req.email, &req.password).await?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        email: user.email,
        name: user.name,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
