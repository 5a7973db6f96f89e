//! Event types for coachd -> client streaming

use chrono::{DateTime, Local};
use coach_util::{SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, SessionStatus};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: coach_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new session was booked
    SessionBooked {
        session_id: SessionId,
        coach_id: UserId,
        client_id: UserId,
        date: DateTime<Local>,
    },

    /// A session's status changed
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

    /// A pending session has entered its cancellation window
    SessionUpcoming {
        session_id: SessionId,
        coach_id: UserId,
        client_id: UserId,
        date: DateTime<Local>,
    },

    /// Configuration was reloaded
    PolicyReloaded { cancellation_window_hours: u32 },

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::StatusChanged {
            session_id: SessionId::new(),
            from: SessionStatus::Pending,
            to: SessionStatus::InProgress,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"status_changed\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::StatusChanged {
                to: SessionStatus::InProgress,
                ..
            }
        ));
    }

    #[test]
    fn shutdown_event_has_no_fields() {
        let json = serde_json::to_string(&EventPayload::Shutdown).unwrap();
        assert_eq!(json, r#"{"type":"shutdown"}"#);
    }
}
