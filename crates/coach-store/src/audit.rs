//! Audit event types

use chrono::{DateTime, Local};
use coach_api::{AuditRecord, SessionStatus};
use coach_util::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Configuration loaded or reloaded
    ConfigLoaded { cancellation_window_hours: u32 },

    /// Session booked
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

    /// Status change refused by the transition policy
    StatusChangeDenied {
        session_id: SessionId,
        from: SessionStatus,
        requested: SessionStatus,
        reasons: Vec<String>,
    },

    /// Notes or schedule edited
    SessionEdited {
        session_id: SessionId,
        rescheduled: bool,
        notes_changed: bool,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Assigned by the store; 0 until appended
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event: AuditEventType,
}

impl AuditEvent {
    /// Event stamped with the service clock
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, coach_util::now())
    }

    /// Event stamped with an explicit time
    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0,
            timestamp,
            event,
        }
    }

    /// View for admin clients
    pub fn to_record(&self) -> AuditRecord {
        AuditRecord {
            id: self.id,
            timestamp: self.timestamp,
            details: serde_json::to_value(&self.event).unwrap_or(serde_json::Value::Null),
        }
    }
}
