//! IPC layer for coachd
//!
//! Provides:
//! - Unix domain socket server
//! - NDJSON (newline-delimited JSON) protocol
//! - Client connection management and event fan-out
//! - Peer UID based roles

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server error: {0}")]
    ServerError(String),
}

impl From<IpcError> for coach_util::CoachError {
    fn from(e: IpcError) -> Self {
        coach_util::CoachError::ipc(e.to_string())
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
