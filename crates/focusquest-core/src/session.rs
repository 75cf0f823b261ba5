//! Session records and the single-open-session guard.
//!
//! One session record is written per timed phase. While a phase runs, its
//! record is "open" (completed = false) and its id is registered in a
//! [`SessionScope`]; finalizing or stopping clears the scope. The scope is
//! what enforces "at most one open record per active timer".

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::timer::PhaseKind;

/// Durable record of one timed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub start_time: DateTime<Utc>,
    pub kind: PhaseKind,
    pub planned_duration_secs: u64,
    pub actual_duration_secs: u64,
    pub interruptions: u32,
    /// false -> true exactly once; no mutation afterwards.
    pub completed: bool,
}

/// The currently open session record, as tracked in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub record_id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub kind: PhaseKind,
    pub started_at: DateTime<Utc>,
}

impl OpenSession {
    /// Snapshot for reconciling an abandoned phase.
    pub fn interrupted(self, interruptions: u32) -> InterruptedPhaseInfo {
        InterruptedPhaseInfo {
            session_record_id: self.record_id,
            task_id: self.task_id,
            kind: self.kind,
            start_time: self.started_at,
            interruptions,
        }
    }
}

/// Transient snapshot of a phase abandoned before natural expiry. The
/// partial duration is reconciled from wall-clock time, never from the
/// countdown counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptedPhaseInfo {
    pub session_record_id: i64,
    pub task_id: i64,
    pub kind: PhaseKind,
    pub start_time: DateTime<Utc>,
    pub interruptions: u32,
}

/// Holder of the single currently-open session record.
#[derive(Debug, Default)]
pub struct SessionScope {
    open: Mutex<Option<OpenSession>>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a scope from persisted state.
    pub fn restore(open: Option<OpenSession>) -> Self {
        Self {
            open: Mutex::new(open),
        }
    }

    /// The open session, if any.
    pub fn current(&self) -> Option<OpenSession> {
        *self.lock()
    }

    /// Register a freshly begun record. Fails if another record is still
    /// open; the caller must abort the start/advance in that case.
    pub fn register(&self, open: OpenSession) -> Result<()> {
        let mut slot = self.lock();
        if let Some(existing) = *slot {
            return Err(SessionError::AlreadyOpen {
                session_id: existing.record_id,
            }
            .into());
        }
        *slot = Some(open);
        Ok(())
    }

    /// Release the open record, returning it for reconciliation.
    pub fn clear(&self) -> Option<OpenSession> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OpenSession>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open(record_id: i64) -> OpenSession {
        OpenSession {
            record_id,
            task_id: 7,
            user_id: 1,
            kind: PhaseKind::Focus,
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn registering_over_an_open_session_fails() {
        let scope = SessionScope::new();
        scope.register(open(1)).unwrap();
        let err = scope.register(open(2)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Session(SessionError::AlreadyOpen { session_id: 1 })
        ));
        // The first registration stays in place.
        assert_eq!(scope.current().unwrap().record_id, 1);
    }

    #[test]
    fn clear_releases_the_slot_for_the_next_phase() {
        let scope = SessionScope::new();
        scope.register(open(1)).unwrap();
        assert_eq!(scope.clear().unwrap().record_id, 1);
        assert!(scope.current().is_none());
        scope.register(open(2)).unwrap();
        assert_eq!(scope.current().unwrap().record_id, 2);
    }

    #[test]
    fn interrupted_snapshot_carries_the_open_record() {
        let o = open(42);
        let info = o.interrupted(3);
        assert_eq!(info.session_record_id, 42);
        assert_eq!(info.task_id, 7);
        assert_eq!(info.kind, PhaseKind::Focus);
        assert_eq!(info.start_time, o.started_at);
        assert_eq!(info.interruptions, 3);
    }
}
