//! Error types for coachd

use thiserror::Error;

use crate::SessionId;

/// Core error type for coachd operations
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoachError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::IpcError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a user-facing rejection rather than a system fault
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::SessionNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CoachError>;
