//! Session status policy and booking engine for coachd
//!
//! This crate is the heart of coachd, containing:
//! - The status transition policy (Pending -> InProgress -> Completed, with
//!   Cancelled reachable outside the cancellation window)
//! - Booking, status change and edit handling on top of the store
//! - Upcoming-session reminders driven by the service tick
//!
//! Nothing in here reads the wall clock: every operation takes `now`.

mod engine;
mod events;
mod status;

pub use engine::*;
pub use events::*;
pub use status::*;
