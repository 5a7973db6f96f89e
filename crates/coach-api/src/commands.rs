//! Command types for the coachd protocol

use chrono::{DateTime, Local};
use coach_util::{ClientId, SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    API_VERSION, AuditRecord, ClientRole, HealthStatus, ReasonCode, ServiceStateSnapshot,
    SessionEdit, SessionFilter, SessionStatus, SessionView,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, ResponseResult::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnsupportedVersion,
    SessionNotFound,
    ValidationFailed,
    PermissionDenied,
    RateLimited,
    ConfigError,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get a summary of the service state
    GetState,

    /// Get health status
    GetHealth,

    /// List sessions matching a filter
    ListSessions {
        #[serde(default)]
        filter: SessionFilter,
    },

    /// Fetch one session with its legal next statuses
    GetSession { session_id: SessionId },

    /// Book a new session (starts out pending)
    BookSession {
        coach_id: UserId,
        client_id: UserId,
        date: DateTime<Local>,
        #[serde(default)]
        notes: String,
    },

    /// Request a status change
    UpdateStatus {
        session_id: SessionId,
        status: SessionStatus,
    },

    /// Edit notes and/or reschedule
    EditSession {
        session_id: SessionId,
        edit: SessionEdit,
    },

    /// Preview the legal next statuses
    AllowedTransitions {
        session_id: SessionId,
        /// Optional: evaluate at a specific time (for preview)
        at_time: Option<DateTime<Local>>,
    },

    /// Reload configuration (admin only)
    ReloadConfig,

    /// Recent audit log entries (admin only)
    GetAuditLog { limit: usize },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command changes stored sessions
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::BookSession { .. } | Command::UpdateStatus { .. } | Command::EditSession { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(ServiceStateSnapshot),
    Health(HealthStatus),
    Sessions(Vec<SessionView>),
    Session(SessionView),
    Booked(SessionView),
    StatusUpdated(SessionView),
    StatusChangeDenied {
        session_id: SessionId,
        reasons: Vec<ReasonCode>,
    },
    Edited(SessionView),
    Transitions {
        session_id: SessionId,
        current: SessionStatus,
        allowed: Vec<SessionStatus>,
    },
    ConfigReloaded,
    AuditLog(Vec<AuditRecord>),
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
