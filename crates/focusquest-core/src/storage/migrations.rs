//! Database schema migrations for focusquest.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version, assuming fresh database");
        }
        0
    })
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: baseline schema.
///
/// Sessions, tasks, per-task and global statistics, the gamification
/// profile with its rewards/challenges/garden/history satellites, and the
/// kv store for persisted engine state.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS pomodoro_sessions (
            id                       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id                  INTEGER NOT NULL,
            task_id                  INTEGER NOT NULL,
            start_time               TEXT NOT NULL,
            phase_kind               TEXT NOT NULL,
            planned_duration_seconds INTEGER NOT NULL,
            actual_duration_seconds  INTEGER NOT NULL DEFAULT 0,
            interruptions            INTEGER NOT NULL DEFAULT 0,
            completed                INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_task ON pomodoro_sessions(task_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_open ON pomodoro_sessions(completed);

        CREATE TABLE IF NOT EXISTS tasks (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id      INTEGER NOT NULL,
            title        TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'TODO',
            tags         TEXT NOT NULL DEFAULT '[]',
            created_at   TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS task_statistics (
            task_id                  INTEGER PRIMARY KEY,
            completion_time          TEXT,
            time_spent_seconds       INTEGER NOT NULL DEFAULT 0,
            total_focus_seconds      INTEGER NOT NULL DEFAULT 0,
            completed_focus_sessions INTEGER NOT NULL DEFAULT 0,
            total_interruptions      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS global_statistics (
            id                       INTEGER PRIMARY KEY CHECK (id = 1),
            total_time_spent_minutes INTEGER NOT NULL DEFAULT 0,
            completed_tasks          INTEGER NOT NULL DEFAULT 0,
            last_active              TEXT
        );

        CREATE TABLE IF NOT EXISTS gamification (
            id                       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id                  INTEGER NOT NULL UNIQUE,
            level                    INTEGER NOT NULL DEFAULT 1,
            experience               INTEGER NOT NULL DEFAULT 0,
            coins                    INTEGER NOT NULL DEFAULT 0,
            max_experience_for_level INTEGER NOT NULL DEFAULT 100,
            last_active              TEXT NOT NULL,
            current_streak           INTEGER NOT NULL DEFAULT 0,
            last_claimed_date        TEXT,
            max_streak               INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS rewards (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            reward_type  TEXT NOT NULL,
            reward_value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS challenges (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status      TEXT NOT NULL DEFAULT 'ACTIVE'
        );

        CREATE TABLE IF NOT EXISTS challenge_rules (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            challenge_id   INTEGER NOT NULL REFERENCES challenges(id),
            rule_type      TEXT NOT NULL,
            target         INTEGER NOT NULL DEFAULT 1,
            period         TEXT NOT NULL DEFAULT 'ONCE',
            condition_json TEXT,
            reward_id      INTEGER REFERENCES rewards(id)
        );
        CREATE INDEX IF NOT EXISTS idx_rules_challenge ON challenge_rules(challenge_id);

        CREATE TABLE IF NOT EXISTS challenge_progress (
            gamification_id INTEGER NOT NULL,
            challenge_id    INTEGER NOT NULL,
            rule_id         INTEGER NOT NULL,
            progress        INTEGER NOT NULL DEFAULT 0,
            completed       INTEGER NOT NULL DEFAULT 0,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (gamification_id, challenge_id, rule_id)
        );

        CREATE TABLE IF NOT EXISTS earned_badges (
            gamification_id INTEGER NOT NULL,
            badge_id        TEXT NOT NULL,
            earned_at       TEXT NOT NULL,
            PRIMARY KEY (gamification_id, badge_id)
        );

        CREATE TABLE IF NOT EXISTS garden_plants (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            gamification_id INTEGER NOT NULL,
            plant_type      TEXT NOT NULL,
            growth_stage    INTEGER NOT NULL DEFAULT 0,
            growth_points   INTEGER NOT NULL DEFAULT 0,
            last_watered    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gamification_history (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            gamification_id   INTEGER NOT NULL,
            timestamp         TEXT NOT NULL,
            xp_change         INTEGER NOT NULL DEFAULT 0,
            coins_change      INTEGER NOT NULL DEFAULT 0,
            reason            TEXT NOT NULL,
            related_entity_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_history_profile
            ON gamification_history(gamification_id, timestamp);

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: per-rule fallback rewards.
///
/// A rule whose primary reward is a badge the profile already owns falls
/// back to this reward instead of failing or double-granting.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE challenge_rules ADD COLUMN fallback_reward_id INTEGER REFERENCES rewards(id);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [2])?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: first-completion gate on task statistics.
///
/// Repeat completions of the same task must not re-grant base rewards;
/// `was_completed_once` records that the task already paid out. Existing
/// rows with a completion time are backfilled as already paid.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE task_statistics ADD COLUMN was_completed_once INTEGER NOT NULL DEFAULT 0;",
    )?;
    tx.execute(
        "UPDATE task_statistics SET was_completed_once = 1 WHERE completion_time IS NOT NULL",
        [],
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [3])?;
    tx.commit()?;
    Ok(())
}
