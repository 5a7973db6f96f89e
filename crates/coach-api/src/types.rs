//! Shared types for the coachd API

use chrono::{DateTime, Local};
use coach_util::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a coaching session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Pending,
        SessionStatus::InProgress,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
    ];

    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable label shared by every client
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "Pending",
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Cancelled => "Cancelled",
        }
    }

    /// No further status change is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown session status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for SessionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "in-progress" | "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" | "canceled" => Ok(SessionStatus::Cancelled),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A scheduled coaching appointment between a coach and a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub coach_id: UserId,
    pub client_id: UserId,
    /// Scheduled start
    pub date: DateTime<Local>,
    pub status: SessionStatus,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Session plus the status options valid at evaluation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session: Session,
    /// Legal next statuses, in display order. Empty for terminal sessions.
    pub allowed_next: Vec<SessionStatus>,
    /// Cancellation is currently refused because the session starts soon
    pub cancellation_locked: bool,
    /// Whole hours until the scheduled start (negative once started)
    pub hours_until: i64,
}

/// Query over stored sessions. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFilter {
    #[serde(default)]
    pub coach_id: Option<UserId>,
    #[serde(default)]
    pub client_id: Option<UserId>,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Inclusive lower bound on `date`
    #[serde(default)]
    pub from: Option<DateTime<Local>>,
    /// Exclusive upper bound on `date`
    #[serde(default)]
    pub to: Option<DateTime<Local>>,
}

impl SessionFilter {
    pub fn for_coach(coach_id: UserId) -> Self {
        Self {
            coach_id: Some(coach_id),
            ..Default::default()
        }
    }

    pub fn for_client(client_id: UserId) -> Self {
        Self {
            client_id: Some(client_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: DateTime<Local>, to: DateTime<Local>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        self.coach_id.as_ref().is_none_or(|c| c == &session.coach_id)
            && self.client_id.as_ref().is_none_or(|c| c == &session.client_id)
            && self.status.is_none_or(|s| s == session.status)
            && self.from.is_none_or(|from| session.date >= from)
            && self.to.is_none_or(|to| session.date < to)
    }
}

/// Partial update of a session's editable fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionEdit {
    /// New scheduled start
    #[serde(default)]
    pub date: Option<DateTime<Local>>,
    /// Replacement notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl SessionEdit {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.notes.is_none()
    }
}

/// Structured reason codes for why a status change was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReasonCode {
    /// Session is in a terminal status
    Terminal { status: SessionStatus },
    /// The requested status is not reachable from the current one
    NotPermitted {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Cancellation refused because the session starts too soon
    CancellationWindow {
        scheduled_at: DateTime<Local>,
        hours_until: i64,
        window_hours: u32,
    },
    /// The session already has the requested status
    Unchanged { status: SessionStatus },
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonCode::Terminal { status } => {
                write!(f, "{} sessions cannot change status", status.label())
            }
            ReasonCode::NotPermitted { from, to } => {
                write!(f, "cannot move from {} to {}", from.label(), to.label())
            }
            ReasonCode::CancellationWindow { window_hours, .. } => write!(
                f,
                "sessions cannot be cancelled within {} hours of the start time",
                window_hours
            ),
            ReasonCode::Unchanged { status } => {
                write!(f, "session is already {}", status.label())
            }
        }
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Local admin - can also reload config and read the audit log
    Admin,
    /// Coach/client front-end - can book, edit and change status
    Member,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_book(&self) -> bool {
        matches!(self, ClientRole::Admin | ClientRole::Member)
    }

    pub fn can_modify(&self) -> bool {
        matches!(self, ClientRole::Admin | ClientRole::Member)
    }

    pub fn can_reload_config(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_read_audit(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub config_loaded: bool,
    pub store_ok: bool,
}

/// Service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub cancellation_window_hours: u32,
    pub session_count: usize,
    #[serde(default)]
    pub status_counts: BTreeMap<SessionStatus, usize>,
    /// Pending sessions that have not started yet, soonest first
    #[serde(default)]
    pub upcoming: Vec<SessionView>,
}

/// Audit log entry as exposed to admin clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub details: serde_json::Value,
}
