use thiserror::Error;

use pilot_core::RunId;

use crate::records::RunStatus;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StateStoreError>;

impl From<StateStoreError> for pilot_core::Error {
    fn from(err: StateStoreError) -> Self {
        match err {
            StateStoreError::NotFound(what) => pilot_core::Error::NotFound(what),
            StateStoreError::InvalidArgument(msg) => pilot_core::Error::InvalidArgument(msg),
            other => pilot_core::Error::Store(other.to_string()),
        }
    }
}
