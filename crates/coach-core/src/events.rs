//! Core events emitted by the engine

use chrono::{DateTime, Local};
use coach_api::SessionStatus;
use coach_util::{SessionId, UserId};

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// New session booked
    SessionBooked {
        session_id: SessionId,
        coach_id: UserId,
        client_id: UserId,
        date: DateTime<Local>,
    },

    /// Status change applied
    StatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Notes or schedule edited
    SessionEdited {
        session_id: SessionId,
        rescheduled: bool,
    },

    /// Pending session entered its cancellation window
    SessionUpcoming {
        session_id: SessionId,
        coach_id: UserId,
        client_id: UserId,
        date: DateTime<Local>,
    },

    /// Session rules were reloaded
    PolicyReloaded { cancellation_window_hours: u32 },
}
