//! Core error types for focusquest-core.
//!
//! This module defines the error hierarchy using thiserror. The completion
//! cascade distinguishes fatal conditions (which roll back the enclosing
//! transaction) from best-effort ones (logged and swallowed at the call
//! site); everything here is fatal unless a caller decides otherwise.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusquest-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session record lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Gamification cascade errors
    #[error("Gamification error: {0}")]
    Gamification(#[from] GamificationError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Session record lifecycle errors. Finalizing twice or beginning a second
/// open record are programming/race faults and always abort the cascade.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session record is already open for this timer
    #[error("Session {session_id} is already open; finish it before starting another")]
    AlreadyOpen { session_id: i64 },

    /// The timer is active but no session record is registered
    #[error("No open session record for the active timer")]
    NoOpenSession,

    /// Session record not found
    #[error("Session record {session_id} not found")]
    NotFound { session_id: i64 },

    /// Session record was already finalized
    #[error("Session record {session_id} is already finalized")]
    AlreadyFinalized { session_id: i64 },
}

/// Gamification cascade errors.
#[derive(Error, Debug)]
pub enum GamificationError {
    /// Profile required for a reward cascade is missing
    #[error("No gamification profile for user {user_id}")]
    ProfileNotFound { user_id: i64 },

    /// Task targeted by a completion is missing
    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: i64 },

    /// Reward row referenced by a challenge rule is missing
    #[error("Reward {reward_id} not found")]
    RewardNotFound { reward_id: i64 },

    /// Garden plant targeted by growth points is missing
    #[error("Plant {plant_id} not found")]
    PlantNotFound { plant_id: i64 },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
