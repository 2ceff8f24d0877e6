//! Error types for worktallyd

use thiserror::Error;

/// Core error type for worktally operations
#[derive(Debug, Error)]
pub enum WorktallyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} belongs to another user")]
    Ownership(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorktallyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn ownership(what: impl Into<String>) -> Self {
        Self::Ownership(what.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::Ipc(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Conflict(_)
                | Self::NotFound(_)
                | Self::Ownership(_)
                | Self::PermissionDenied(_)
                | Self::RateLimited
        )
    }
}

pub type Result<T> = std::result::Result<T, WorktallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_resource() {
        let err = WorktallyError::not_found("Session 42");
        assert_eq!(err.to_string(), "Session 42 not found");

        let err = WorktallyError::ownership("Category 7");
        assert_eq!(err.to_string(), "Category 7 belongs to another user");
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(WorktallyError::conflict("active").is_client_error());
        assert!(WorktallyError::RateLimited.is_client_error());
        assert!(!WorktallyError::store("disk full").is_client_error());
        assert!(!WorktallyError::internal("boom").is_client_error());
    }
}
