use thiserror::Error;

use crate::auth::AuthError;

/// Error type for the durable key/value and document stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Error type surfaced by the router and profile operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Validation(String),
    #[error("no active session")]
    NoSession,
}

pub type CoreResult<T> = Result<T, CoreError>;
