mod config;
pub mod database;
pub mod gamification_db;
pub mod migrations;
pub mod session_db;
pub mod stats_db;
pub mod task_db;

pub use config::{Config, RewardsConfig, ScheduleConfig};
pub use database::Database;
pub use stats_db::{GlobalStatistics, TaskStatistics};

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Parse a stored RFC3339 timestamp, falling back to the current time for
/// rows written by hand or damaged in transit.
pub(crate) fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Returns `~/.config/focusquest[-dev]/` based on FOCUSQUEST_ENV.
///
/// Set FOCUSQUEST_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FOCUSQUEST_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("focusquest-dev")
    } else {
        base_dir.join("focusquest")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
