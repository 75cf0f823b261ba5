//! Per-task and global statistics queries.
//!
//! Task statistics are created on demand (first write wins the insert)
//! so every mutation helper can assume the row exists. Global statistics
//! are a single row with id 1.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

use super::parse_datetime_fallback;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub task_id: i64,
    pub completion_time: Option<DateTime<Utc>>,
    pub time_spent_seconds: i64,
    pub total_focus_seconds: i64,
    pub completed_focus_sessions: i64,
    pub total_interruptions: i64,
    /// Set after the first full completion paid out its base rewards;
    /// repeat completions skip the payout.
    pub was_completed_once: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStatistics {
    pub total_time_spent_minutes: i64,
    pub completed_tasks: i64,
    pub last_active: Option<DateTime<Utc>>,
}

// ── Task statistics ──────────────────────────────────────────────────

/// Create the statistics row for a task if it doesn't exist yet.
pub fn ensure_task_stats(conn: &Connection, task_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO task_statistics (task_id) VALUES (?1)",
        params![task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn get_task_stats(conn: &Connection, task_id: i64) -> Result<Option<TaskStatistics>> {
    conn.query_row(
        "SELECT task_id, completion_time, time_spent_seconds, total_focus_seconds,
                completed_focus_sessions, total_interruptions, was_completed_once
         FROM task_statistics WHERE task_id = ?1",
        params![task_id],
        row_to_task_stats,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

pub fn add_time_spent(conn: &Connection, task_id: i64, seconds: i64) -> Result<()> {
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics
         SET time_spent_seconds = time_spent_seconds + ?1
         WHERE task_id = ?2",
        params![seconds, task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn add_focus_time(conn: &Connection, task_id: i64, seconds: i64) -> Result<()> {
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics
         SET total_focus_seconds = total_focus_seconds + ?1
         WHERE task_id = ?2",
        params![seconds, task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn increment_focus_sessions(conn: &Connection, task_id: i64) -> Result<()> {
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics
         SET completed_focus_sessions = completed_focus_sessions + 1
         WHERE task_id = ?1",
        params![task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn add_interruptions(conn: &Connection, task_id: i64, count: i64) -> Result<()> {
    if count == 0 {
        return Ok(());
    }
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics
         SET total_interruptions = total_interruptions + ?1
         WHERE task_id = ?2",
        params![count, task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn mark_completion_time(conn: &Connection, task_id: i64, now: DateTime<Utc>) -> Result<()> {
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics SET completion_time = ?1 WHERE task_id = ?2",
        params![now.to_rfc3339(), task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn mark_completed_once(conn: &Connection, task_id: i64) -> Result<()> {
    ensure_task_stats(conn, task_id)?;
    conn.execute(
        "UPDATE task_statistics SET was_completed_once = 1 WHERE task_id = ?1",
        params![task_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

fn row_to_task_stats(
    row: &rusqlite::Row,
) -> std::result::Result<TaskStatistics, rusqlite::Error> {
    let completion_time: Option<String> = row.get(1)?;
    Ok(TaskStatistics {
        task_id: row.get(0)?,
        completion_time: completion_time.as_deref().map(parse_datetime_fallback),
        time_spent_seconds: row.get(2)?,
        total_focus_seconds: row.get(3)?,
        completed_focus_sessions: row.get(4)?,
        total_interruptions: row.get(5)?,
        was_completed_once: row.get::<_, i64>(6)? != 0,
    })
}

// ── Global statistics ────────────────────────────────────────────────

fn ensure_global(conn: &Connection) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO global_statistics (id) VALUES (1)", [])
        .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn get_global_stats(conn: &Connection) -> Result<GlobalStatistics> {
    let row = conn
        .query_row(
            "SELECT total_time_spent_minutes, completed_tasks, last_active
             FROM global_statistics WHERE id = 1",
            [],
            |row| {
                let last_active: Option<String> = row.get(2)?;
                Ok(GlobalStatistics {
                    total_time_spent_minutes: row.get(0)?,
                    completed_tasks: row.get(1)?,
                    last_active: last_active.as_deref().map(parse_datetime_fallback),
                })
            },
        )
        .optional()
        .map_err(DatabaseError::from)?;
    Ok(row.unwrap_or_default())
}

pub fn add_global_minutes(conn: &Connection, minutes: i64) -> Result<()> {
    if minutes == 0 {
        return Ok(());
    }
    ensure_global(conn)?;
    conn.execute(
        "UPDATE global_statistics
         SET total_time_spent_minutes = total_time_spent_minutes + ?1
         WHERE id = 1",
        params![minutes],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn increment_completed_tasks(conn: &Connection) -> Result<()> {
    ensure_global(conn)?;
    conn.execute(
        "UPDATE global_statistics SET completed_tasks = completed_tasks + 1 WHERE id = 1",
        [],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn update_global_last_active(conn: &Connection, now: DateTime<Utc>) -> Result<()> {
    ensure_global(conn)?;
    conn.execute(
        "UPDATE global_statistics SET last_active = ?1 WHERE id = 1",
        params![now.to_rfc3339()],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}
