//! Session record queries.
//!
//! One row per timed phase. `finalize_session` is the exactly-once gate
//! for the whole completion cascade: the guarded UPDATE refuses to touch
//! a row that is already completed, so a duplicate Confirm fails here
//! before any statistics or rewards are double-applied.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DatabaseError, Result, SessionError};
use crate::session::SessionRecord;
use crate::timer::PhaseKind;

use super::parse_datetime_fallback;

/// Insert an open (completed = 0) session record and return its id.
pub fn begin_session(
    conn: &Connection,
    user_id: i64,
    task_id: i64,
    kind: PhaseKind,
    planned_duration_secs: u64,
    start_time: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO pomodoro_sessions
            (user_id, task_id, start_time, phase_kind, planned_duration_seconds)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            task_id,
            start_time.to_rfc3339(),
            kind.as_str(),
            planned_duration_secs,
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

/// Mark a record completed, exactly once.
///
/// Finalizing a missing record or one already completed is an error; both
/// abort the enclosing transaction.
pub fn finalize_session(
    conn: &Connection,
    session_id: i64,
    actual_duration_secs: u64,
    interruptions: u32,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE pomodoro_sessions
             SET completed = 1, actual_duration_seconds = ?1, interruptions = ?2
             WHERE id = ?3 AND completed = 0",
            params![actual_duration_secs, interruptions, session_id],
        )
        .map_err(DatabaseError::from)?;
    if updated == 1 {
        return Ok(());
    }
    match get_session(conn, session_id)? {
        Some(_) => Err(SessionError::AlreadyFinalized { session_id }.into()),
        None => Err(SessionError::NotFound { session_id }.into()),
    }
}

pub fn get_session(conn: &Connection, session_id: i64) -> Result<Option<SessionRecord>> {
    conn.query_row(
        "SELECT id, user_id, task_id, start_time, phase_kind,
                planned_duration_seconds, actual_duration_seconds,
                interruptions, completed
         FROM pomodoro_sessions WHERE id = ?1",
        params![session_id],
        row_to_session,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

/// Most recent record still open, if any. Used to reconcile a session
/// left behind by a process that died mid-phase.
pub fn latest_open_session(conn: &Connection) -> Result<Option<SessionRecord>> {
    conn.query_row(
        "SELECT id, user_id, task_id, start_time, phase_kind,
                planned_duration_seconds, actual_duration_seconds,
                interruptions, completed
         FROM pomodoro_sessions WHERE completed = 0
         ORDER BY id DESC LIMIT 1",
        [],
        row_to_session,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

/// Build a SessionRecord from a database row.
fn row_to_session(row: &rusqlite::Row) -> std::result::Result<SessionRecord, rusqlite::Error> {
    let start_time_str: String = row.get(3)?;
    let kind_str: String = row.get(4)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        start_time: parse_datetime_fallback(&start_time_str),
        kind: PhaseKind::parse(&kind_str).unwrap_or(PhaseKind::Focus),
        planned_duration_secs: row.get(5)?,
        actual_duration_secs: row.get(6)?,
        interruptions: row.get(7)?,
        completed: row.get::<_, i64>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::Database;

    #[test]
    fn begin_inserts_an_open_record() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let id = begin_session(db.conn(), 1, 7, PhaseKind::Focus, 1500, now).unwrap();

        let record = get_session(db.conn(), id).unwrap().unwrap();
        assert_eq!(record.task_id, 7);
        assert_eq!(record.kind, PhaseKind::Focus);
        assert_eq!(record.planned_duration_secs, 1500);
        assert_eq!(record.actual_duration_secs, 0);
        assert!(!record.completed);
        assert_eq!(latest_open_session(db.conn()).unwrap().unwrap().id, id);
    }

    #[test]
    fn finalize_is_exactly_once() {
        let db = Database::open_memory().unwrap();
        let id = begin_session(db.conn(), 1, 7, PhaseKind::Focus, 1500, Utc::now()).unwrap();

        finalize_session(db.conn(), id, 650, 2).unwrap();
        let record = get_session(db.conn(), id).unwrap().unwrap();
        assert!(record.completed);
        assert_eq!(record.actual_duration_secs, 650);
        assert_eq!(record.interruptions, 2);
        assert!(latest_open_session(db.conn()).unwrap().is_none());

        let err = finalize_session(db.conn(), id, 700, 0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Session(SessionError::AlreadyFinalized { session_id }) if session_id == id
        ));
        // The second call altered nothing.
        let record = get_session(db.conn(), id).unwrap().unwrap();
        assert_eq!(record.actual_duration_secs, 650);
    }

    #[test]
    fn finalizing_a_missing_record_is_an_error() {
        let db = Database::open_memory().unwrap();
        let err = finalize_session(db.conn(), 999, 100, 0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Session(SessionError::NotFound { session_id: 999 })
        ));
    }
}
