use cradle_store::StoreError;

use crate::identity::IdentityError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("could not decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("session file error: {0}")]
    Session(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
