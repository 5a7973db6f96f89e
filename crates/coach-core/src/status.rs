//! Session status transition policy

use chrono::{DateTime, Local};
use coach_api::{ReasonCode, Session, SessionStatus, SessionView};
use coach_config::DEFAULT_CANCELLATION_WINDOW_HOURS;
use coach_util::whole_hours_until;

/// Decides which status changes are legal for a session at a given time.
///
/// - `Pending` may move to `InProgress` or `Completed`, and to `Cancelled`
///   unless the session is inside the cancellation window.
/// - `InProgress` may move to `Completed`, and to `Cancelled` under the same
///   window rule.
/// - `Completed` is terminal.
/// - `Cancelled` may only be reset to `Pending`.
///
/// The cancellation window is the open interval `0 < hours < window_hours`,
/// where `hours` is the floor of the time remaining until the scheduled
/// start. A session exactly `window_hours` away, one starting within the
/// current hour, or one already started can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatusPolicy {
    window_hours: u32,
}

impl SessionStatusPolicy {
    pub const fn new(window_hours: u32) -> Self {
        Self { window_hours }
    }

    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    /// Whether cancelling a session scheduled at `scheduled_at` is refused at `now`
    pub fn cancellation_locked(&self, scheduled_at: &DateTime<Local>, now: &DateTime<Local>) -> bool {
        let hours = whole_hours_until(scheduled_at, now);
        hours > 0 && hours < i64::from(self.window_hours)
    }

    /// Legal next statuses, in display order. Empty means terminal.
    pub fn allowed_next_statuses(
        &self,
        current: SessionStatus,
        scheduled_at: &DateTime<Local>,
        now: &DateTime<Local>,
    ) -> Vec<SessionStatus> {
        let can_cancel = !self.cancellation_locked(scheduled_at, now);

        let mut next = match current {
            SessionStatus::Pending => vec![SessionStatus::InProgress, SessionStatus::Completed],
            SessionStatus::InProgress => vec![SessionStatus::Completed],
            SessionStatus::Completed => return Vec::new(),
            SessionStatus::Cancelled => return vec![SessionStatus::Pending],
        };

        if can_cancel {
            next.push(SessionStatus::Cancelled);
        }
        next
    }

    pub fn is_transition_allowed(
        &self,
        current: SessionStatus,
        requested: SessionStatus,
        scheduled_at: &DateTime<Local>,
        now: &DateTime<Local>,
    ) -> bool {
        self.allowed_next_statuses(current, scheduled_at, now)
            .contains(&requested)
    }

    /// Like [`is_transition_allowed`](Self::is_transition_allowed), but says
    /// why a change is refused.
    pub fn check_transition(
        &self,
        current: SessionStatus,
        requested: SessionStatus,
        scheduled_at: &DateTime<Local>,
        now: &DateTime<Local>,
    ) -> Result<(), ReasonCode> {
        if self.is_transition_allowed(current, requested, scheduled_at, now) {
            return Ok(());
        }

        if current.is_terminal() {
            return Err(ReasonCode::Terminal { status: current });
        }

        if requested == current {
            return Err(ReasonCode::Unchanged { status: current });
        }

        if requested == SessionStatus::Cancelled && current != SessionStatus::Cancelled {
            return Err(ReasonCode::CancellationWindow {
                scheduled_at: *scheduled_at,
                hours_until: whole_hours_until(scheduled_at, now),
                window_hours: self.window_hours,
            });
        }

        Err(ReasonCode::NotPermitted {
            from: current,
            to: requested,
        })
    }

    /// Session annotated with its options at `now`
    pub fn view(&self, session: Session, now: &DateTime<Local>) -> SessionView {
        let allowed_next = self.allowed_next_statuses(session.status, &session.date, now);
        let cancellation_locked = matches!(
            session.status,
            SessionStatus::Pending | SessionStatus::InProgress
        ) && self.cancellation_locked(&session.date, now);
        let hours_until = whole_hours_until(&session.date, now);

        SessionView {
            session,
            allowed_next,
            cancellation_locked,
            hours_until,
        }
    }
}

impl Default for SessionStatusPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CANCELLATION_WINDOW_HOURS)
    }
}
