//! Core booking engine

use chrono::{DateTime, Local};
use coach_api::{
    API_VERSION, HealthStatus, ReasonCode, ServiceStateSnapshot, Session, SessionEdit,
    SessionFilter, SessionStatus, SessionView,
};
use coach_config::Config;
use coach_store::{AuditEvent, AuditEventType, Store};
use coach_util::{CoachError, Result, SessionId, UserId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreEvent, SessionStatusPolicy};

/// Upcoming sessions included in a state snapshot
const UPCOMING_LIMIT: usize = 20;

/// A request to book a new session
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub coach_id: UserId,
    pub client_id: UserId,
    pub date: DateTime<Local>,
    pub notes: String,
}

/// Booking decision from the core engine
#[derive(Debug)]
pub enum BookingDecision {
    Booked { view: SessionView, event: CoreEvent },
    Rejected { reasons: Vec<String> },
}

/// Status change decision from the core engine
#[derive(Debug)]
pub enum StatusChangeDecision {
    Applied { view: SessionView, event: CoreEvent },
    Denied { reasons: Vec<ReasonCode> },
}

/// Edit decision from the core engine
#[derive(Debug)]
pub enum EditDecision {
    Applied { view: SessionView, event: CoreEvent },
    Rejected { reasons: Vec<String> },
}

/// The core booking engine
pub struct CoachEngine {
    config: Config,
    policy: SessionStatusPolicy,
    store: Arc<dyn Store>,
    /// Pending sessions already announced as upcoming
    reminded: HashSet<SessionId>,
}

impl CoachEngine {
    /// Create a new core engine
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let window = config.sessions.cancellation_window_hours;
        info!(cancellation_window_hours = window, "Core engine initialized");

        let _ = store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
            cancellation_window_hours: window,
        }));

        Self {
            policy: SessionStatusPolicy::new(window),
            config,
            store,
            reminded: HashSet::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &SessionStatusPolicy {
        &self.policy
    }

    /// Swap in a new configuration
    pub fn reload_config(&mut self, config: Config) -> CoreEvent {
        let window = config.sessions.cancellation_window_hours;
        self.policy = SessionStatusPolicy::new(window);
        self.config = config;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
            cancellation_window_hours: window,
        }));

        info!(cancellation_window_hours = window, "Configuration reloaded");

        CoreEvent::PolicyReloaded {
            cancellation_window_hours: window,
        }
    }

    fn load(&self, id: &SessionId) -> Result<Session> {
        self.store
            .get_session(id)?
            .ok_or_else(|| CoachError::SessionNotFound(id.clone()))
    }

    fn notes_too_long(&self, notes: &str) -> Option<String> {
        let max = self.config.sessions.max_notes_chars;
        let len = notes.chars().count();
        (len > max).then(|| format!("notes are {} characters, the limit is {}", len, max))
    }

    /// Book a new session. It starts out pending.
    pub fn book_session(
        &self,
        request: BookingRequest,
        now: DateTime<Local>,
    ) -> Result<BookingDecision> {
        let mut reasons = Vec::new();

        if request.coach_id.as_str().trim().is_empty() {
            reasons.push("coach is required".to_string());
        }
        if request.client_id.as_str().trim().is_empty() {
            reasons.push("client is required".to_string());
        }
        if request.coach_id == request.client_id {
            reasons.push("coach and client must be different users".to_string());
        }
        if request.date < now && !self.config.sessions.allow_past_booking {
            reasons.push(format!(
                "cannot book a session in the past ({})",
                coach_util::format_datetime_full(&request.date)
            ));
        }
        if let Some(reason) = self.notes_too_long(&request.notes) {
            reasons.push(reason);
        }

        if !reasons.is_empty() {
            debug!(
                coach_id = %request.coach_id,
                client_id = %request.client_id,
                ?reasons,
                "Booking rejected"
            );
            return Ok(BookingDecision::Rejected { reasons });
        }

        let session = Session {
            id: SessionId::new(),
            coach_id: request.coach_id,
            client_id: request.client_id,
            date: request.date,
            status: SessionStatus::Pending,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_session(&session)?;

        let _ = self.store.append_audit(AuditEvent::at(
            AuditEventType::SessionBooked {
                session_id: session.id.clone(),
                coach_id: session.coach_id.clone(),
                client_id: session.client_id.clone(),
                date: session.date,
            },
            now,
        ));

        info!(
            session_id = %session.id,
            coach_id = %session.coach_id,
            client_id = %session.client_id,
            date = %session.date,
            "Session booked"
        );

        let event = CoreEvent::SessionBooked {
            session_id: session.id.clone(),
            coach_id: session.coach_id.clone(),
            client_id: session.client_id.clone(),
            date: session.date,
        };

        Ok(BookingDecision::Booked {
            view: self.policy.view(session, &now),
            event,
        })
    }

    /// Request a status change. Denials are audited; the session is untouched.
    pub fn request_status_change(
        &mut self,
        id: &SessionId,
        requested: SessionStatus,
        now: DateTime<Local>,
    ) -> Result<StatusChangeDecision> {
        let mut session = self.load(id)?;
        let from = session.status;

        if let Err(reason) = self
            .policy
            .check_transition(from, requested, &session.date, &now)
        {
            warn!(
                session_id = %id,
                from = %from,
                requested = %requested,
                reason = %reason,
                "Status change denied"
            );

            let _ = self.store.append_audit(AuditEvent::at(
                AuditEventType::StatusChangeDenied {
                    session_id: id.clone(),
                    from,
                    requested,
                    reasons: vec![reason.to_string()],
                },
                now,
            ));

            return Ok(StatusChangeDecision::Denied {
                reasons: vec![reason],
            });
        }

        session.status = requested;
        session.updated_at = now;
        self.store.update_session(&session)?;
        self.reminded.remove(id);

        let _ = self.store.append_audit(AuditEvent::at(
            AuditEventType::StatusChanged {
                session_id: id.clone(),
                from,
                to: requested,
            },
            now,
        ));

        info!(session_id = %id, from = %from, to = %requested, "Session status changed");

        Ok(StatusChangeDecision::Applied {
            view: self.policy.view(session, &now),
            event: CoreEvent::StatusChanged {
                session_id: id.clone(),
                from,
                to: requested,
            },
        })
    }

    /// Edit notes or reschedule.
    ///
    /// Completed sessions are read-only. Only pending sessions can be
    /// rescheduled.
    pub fn edit_session(
        &mut self,
        id: &SessionId,
        edit: SessionEdit,
        now: DateTime<Local>,
    ) -> Result<EditDecision> {
        let mut session = self.load(id)?;

        if edit.is_empty() {
            return Ok(EditDecision::Rejected {
                reasons: vec!["nothing to change".to_string()],
            });
        }

        if session.status.is_terminal() {
            return Ok(EditDecision::Rejected {
                reasons: vec![format!(
                    "{} sessions are read-only",
                    session.status.label()
                )],
            });
        }

        let mut reasons = Vec::new();

        if let Some(date) = edit.date {
            if session.status != SessionStatus::Pending {
                reasons.push(format!(
                    "only pending sessions can be rescheduled (this one is {})",
                    session.status.label()
                ));
            } else if date < now && !self.config.sessions.allow_past_booking {
                reasons.push(format!(
                    "cannot reschedule into the past ({})",
                    coach_util::format_datetime_full(&date)
                ));
            }
        }
        if let Some(notes) = &edit.notes
            && let Some(reason) = self.notes_too_long(notes)
        {
            reasons.push(reason);
        }

        if !reasons.is_empty() {
            debug!(session_id = %id, ?reasons, "Edit rejected");
            return Ok(EditDecision::Rejected { reasons });
        }

        let rescheduled = edit.date.is_some_and(|date| date != session.date);
        let notes_changed = edit
            .notes
            .as_ref()
            .is_some_and(|notes| notes != &session.notes);

        if let Some(date) = edit.date {
            session.date = date;
        }
        if let Some(notes) = edit.notes {
            session.notes = notes;
        }
        session.updated_at = now;
        self.store.update_session(&session)?;

        if rescheduled {
            self.reminded.remove(id);
        }

        let _ = self.store.append_audit(AuditEvent::at(
            AuditEventType::SessionEdited {
                session_id: id.clone(),
                rescheduled,
                notes_changed,
            },
            now,
        ));

        info!(session_id = %id, rescheduled, notes_changed, "Session edited");

        Ok(EditDecision::Applied {
            view: self.policy.view(session, &now),
            event: CoreEvent::SessionEdited {
                session_id: id.clone(),
                rescheduled,
            },
        })
    }

    /// Fetch one session with its options at `now`
    pub fn get_session(&self, id: &SessionId, now: DateTime<Local>) -> Result<Option<SessionView>> {
        Ok(self
            .store
            .get_session(id)?
            .map(|session| self.policy.view(session, &now)))
    }

    /// Sessions matching `filter`, soonest first
    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
        now: DateTime<Local>,
    ) -> Result<Vec<SessionView>> {
        Ok(self
            .store
            .list_sessions(filter)?
            .into_iter()
            .map(|session| self.policy.view(session, &now))
            .collect())
    }

    /// Current status and legal next statuses of a session at `now`
    pub fn allowed_transitions(
        &self,
        id: &SessionId,
        now: DateTime<Local>,
    ) -> Result<(SessionStatus, Vec<SessionStatus>)> {
        let session = self.load(id)?;
        let allowed = self
            .policy
            .allowed_next_statuses(session.status, &session.date, &now);
        Ok((session.status, allowed))
    }

    /// Periodic scan: announce pending sessions that entered the
    /// cancellation window since the last tick.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<CoreEvent> {
        let filter = SessionFilter {
            status: Some(SessionStatus::Pending),
            from: Some(now),
            ..Default::default()
        };

        let pending = match self.store.list_sessions(&filter) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "Reminder scan failed");
                return Vec::new();
            }
        };

        let locked: Vec<Session> = pending
            .into_iter()
            .filter(|s| self.policy.cancellation_locked(&s.date, &now))
            .collect();

        self.reminded
            .retain(|id| locked.iter().any(|s| &s.id == id));

        let mut events = Vec::new();
        for session in locked {
            if self.reminded.insert(session.id.clone()) {
                debug!(session_id = %session.id, date = %session.date, "Session upcoming");
                events.push(CoreEvent::SessionUpcoming {
                    session_id: session.id,
                    coach_id: session.coach_id,
                    client_id: session.client_id,
                    date: session.date,
                });
            }
        }

        events
    }

    /// Summary of stored sessions at `now`
    pub fn get_state(&self, now: DateTime<Local>) -> Result<ServiceStateSnapshot> {
        let sessions = self.store.list_sessions(&SessionFilter::default())?;

        let mut status_counts = BTreeMap::new();
        for session in &sessions {
            *status_counts.entry(session.status).or_insert(0) += 1;
        }

        let session_count = sessions.len();
        let upcoming = sessions
            .into_iter()
            .filter(|s| s.status == SessionStatus::Pending && s.date >= now)
            .take(UPCOMING_LIMIT)
            .map(|s| self.policy.view(s, &now))
            .collect();

        Ok(ServiceStateSnapshot {
            api_version: API_VERSION,
            cancellation_window_hours: self.policy.window_hours(),
            session_count,
            status_counts,
            upcoming,
        })
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok,
            config_loaded: true,
            store_ok,
        }
    }
}
