//! Protocol types for coachd IPC
//!
//! This crate defines the stable API between coachd and its clients:
//! - Session entity, status and views
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
