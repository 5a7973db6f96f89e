//! Shared utilities for coachd
//!
//! This crate provides:
//! - ID types (SessionId, UserId, ClientId)
//! - Wall-clock access with a mockable `now()` and whole-hour arithmetic
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, config and log directories

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
