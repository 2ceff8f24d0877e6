//! Persistence layer for worktallyd
//!
//! Provides:
//! - Session records with a one-active-session-per-user constraint
//! - Categories and work targets
//! - Evaluation write sets (evaluation + notification + punishment), one per target and day
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;
use worktally_util::WorktallyError;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for WorktallyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => WorktallyError::NotFound(what),
            StoreError::Conflict(msg) => WorktallyError::Conflict(msg),
            other => WorktallyError::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
