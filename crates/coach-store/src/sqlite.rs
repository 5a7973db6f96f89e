//! SQLite-based store implementation

use chrono::{DateTime, Local};
use coach_api::{Session, SessionFilter, SessionStatus};
use coach_util::{SessionId, UserId};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Coaching sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                coach_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                date TEXT NOT NULL,
                date_ts INTEGER NOT NULL,
                status TEXT NOT NULL
                    CHECK (status IN ('pending', 'in-progress', 'completed', 'cancelled')),
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_coach ON sessions(coach_id, date_ts);
            CREATE INDEX IF NOT EXISTS idx_sessions_client ON sessions(client_id, date_ts);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status, date_ts);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

const SESSION_COLUMNS: &str =
    "id, coach_id, client_id, date, status, notes, created_at, updated_at";

/// Raw column values, converted outside the rusqlite row callback
struct SessionRow {
    id: String,
    coach_id: String,
    client_id: String,
    date: String,
    status: String,
    notes: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            coach_id: row.get(1)?,
            client_id: row.get(2)?,
            date: row.get(3)?,
            status: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_session(self) -> StoreResult<Session> {
        let id = self
            .id
            .parse::<SessionId>()
            .map_err(|e| StoreError::Serialization(format!("session id '{}': {}", self.id, e)))?;
        let status = self
            .status
            .parse::<SessionStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Session {
            id,
            coach_id: UserId::new(self.coach_id),
            client_id: UserId::new(self.client_id),
            date: parse_timestamp(&self.date)?,
            status,
            notes: self.notes,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("timestamp '{}': {}", s, e)))
}

impl Store for SqliteStore {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO sessions
                (id, coach_id, client_id, date, date_ts, status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                session.id.to_string(),
                session.coach_id.as_str(),
                session.client_id.as_str(),
                session.date.to_rfc3339(),
                session.date.timestamp(),
                session.status.as_str(),
                session.notes,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;

        debug!(session_id = %session.id, "Session inserted");
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
                [id.to_string()],
                SessionRow::from_row,
            )
            .optional()?;

        row.map(SessionRow::into_session).transpose()
    }

    fn list_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;

        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(coach_id) = &filter.coach_id {
            clauses.push("coach_id = ?");
            values.push(Value::Text(coach_id.as_str().to_string()));
        }
        if let Some(client_id) = &filter.client_id {
            clauses.push("client_id = ?");
            values.push(Value::Text(client_id.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(from) = filter.from {
            clauses.push("date_ts >= ?");
            values.push(Value::Integer(from.timestamp()));
        }
        if let Some(to) = filter.to {
            clauses.push("date_ts < ?");
            values.push(Value::Integer(to.timestamp()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM sessions {} ORDER BY date_ts ASC, id ASC",
            SESSION_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), SessionRow::from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }

        debug!(count = sessions.len(), "Sessions listed");
        Ok(sessions)
    }

    fn update_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            UPDATE sessions
            SET coach_id = ?, client_id = ?, date = ?, date_ts = ?, status = ?,
                notes = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                session.coach_id.as_str(),
                session.client_id.as_str(),
                session.date.to_rfc3339(),
                session.date.timestamp(),
                session.status.as_str(),
                session.notes,
                session.updated_at.to_rfc3339(),
                session.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }

        debug!(session_id = %session.id, status = %session.status, "Session updated");
        Ok(())
    }

    fn append_audit(&self, event: AuditEvent) -> StoreResult<i64> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        let id = conn.last_insert_rowid();
        debug!(event_id = id, "Audit event appended");

        Ok(id)
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp)?,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
