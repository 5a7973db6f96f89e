//! Store trait definitions

use coach_api::{Session, SessionFilter};
use coach_util::SessionId;

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Sessions

    /// Insert a newly booked session
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Fetch a session by ID
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Sessions matching `filter`, ordered by scheduled start
    fn list_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<Session>>;

    /// Overwrite a stored session; `NotFound` if it does not exist
    fn update_session(&self, session: &Session) -> StoreResult<()>;

    // Audit log

    /// Append an audit event, returning its assigned ID
    fn append_audit(&self, event: AuditEvent) -> StoreResult<i64>;

    /// Most recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
