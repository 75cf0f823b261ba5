//! Task queries. Tags are stored as a JSON array in one column.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DatabaseError, Result};
use crate::task::{Task, TaskStatus};

use super::parse_datetime_fallback;

pub fn insert_task(
    conn: &Connection,
    user_id: i64,
    title: &str,
    tags: &[String],
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let tags_json = serde_json::to_string(tags)?;
    conn.execute(
        "INSERT INTO tasks (user_id, title, status, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            title,
            TaskStatus::Todo.as_str(),
            tags_json,
            created_at.to_rfc3339(),
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn get_task(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, title, status, tags, created_at, completed_at
             FROM tasks WHERE id = ?1",
            params![task_id],
            row_to_raw_task,
        )
        .optional()
        .map_err(DatabaseError::from)?;
    row.map(raw_to_task).transpose()
}

pub fn list_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, title, status, tags, created_at, completed_at
             FROM tasks ORDER BY id",
        )
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map([], row_to_raw_task)
        .map_err(DatabaseError::from)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(raw_to_task(row.map_err(DatabaseError::from)?)?);
    }
    Ok(tasks)
}

/// Update a task's status, stamping completed_at when it becomes DONE.
pub fn set_task_status(
    conn: &Connection,
    task_id: i64,
    status: TaskStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    if status.is_done() {
        conn.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), task_id],
        )
    } else {
        conn.execute(
            "UPDATE tasks SET status = ?1, completed_at = NULL WHERE id = ?2",
            params![status.as_str(), task_id],
        )
    }
    .map_err(DatabaseError::from)?;
    Ok(())
}

// Raw row before tag JSON decoding; decoding errors become CoreError,
// not rusqlite errors.
struct RawTask {
    id: i64,
    user_id: i64,
    title: String,
    status: String,
    tags_json: String,
    created_at: String,
    completed_at: Option<String>,
}

fn row_to_raw_task(row: &rusqlite::Row) -> std::result::Result<RawTask, rusqlite::Error> {
    Ok(RawTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        tags_json: row.get(4)?,
        created_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

fn raw_to_task(raw: RawTask) -> Result<Task> {
    let tags: Vec<String> = serde_json::from_str(&raw.tags_json)?;
    Ok(Task {
        id: raw.id,
        user_id: raw.user_id,
        title: raw.title,
        status: TaskStatus::parse(&raw.status).unwrap_or_default(),
        tags,
        created_at: parse_datetime_fallback(&raw.created_at),
        completed_at: raw.completed_at.as_deref().map(parse_datetime_fallback),
    })
}
