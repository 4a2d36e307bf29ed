use std::path::PathBuf;

use cradle_core::logs::TimestampPolicies;
use cradle_types::models::Category;

/// Secrets shipped in example env files; never accepted.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CRADLE_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("CRADLE_PORT is not a valid port: {0}")]
    InvalidPort(String),

    #[error("CRADLE_TIMESTAMP_REFRESH: {0}")]
    InvalidCategory(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub service_account_path: PathBuf,
    pub timestamp_policies: TimestampPolicies,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("CRADLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let host = lookup("CRADLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port_text = lookup("CRADLE_PORT").unwrap_or_else(|| "3000".into());
        let port = port_text
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port_text.clone()))?;
        let db_path: PathBuf = lookup("CRADLE_DB_PATH").unwrap_or_else(|| "cradle.db".into()).into();
        let service_account_path: PathBuf = lookup("CRADLE_SERVICE_ACCOUNT_PATH")
            .unwrap_or_else(|| "service-account.json".into())
            .into();

        let refreshing = lookup("CRADLE_TIMESTAMP_REFRESH")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Category>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::InvalidCategory)?;

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            service_account_path,
            timestamp_policies: TimestampPolicies::refreshing(refreshing),
        })
    }
}
