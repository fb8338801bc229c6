//! Error taxonomy for the evolution pipeline.
//!
//! Only storage failures escape the pipeline. Collaborator and parse
//! failures are absorbed at the call site and replaced by fallbacks.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn pet_not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { kind: "pet", id: id.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
