//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Phase schedule parameters (focus/break lengths, cycle size)
//! - Reward tuning (base XP/coin formulas, growth points,
//!   significance threshold)
//!
//! Configuration is stored at `~/.config/focusquest/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::timer::ScheduleParams;

/// Schedule-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_focuses_before_long_break")]
    pub focuses_before_long_break: u32,
    /// Estimates below this many remaining minutes don't get another
    /// full focus phase.
    #[serde(default = "default_minimum_tail_minutes")]
    pub minimum_tail_minutes: u32,
}

/// Reward tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Value expression for XP per significant focus phase.
    #[serde(default = "default_focus_xp")]
    pub focus_xp: String,
    /// Value expression for coins per significant focus phase.
    #[serde(default = "default_focus_coins")]
    pub focus_coins: String,
    #[serde(default = "default_growth_points_per_focus")]
    pub growth_points_per_focus: i64,
    /// Focus phases shorter than this don't count as sessions and earn
    /// no rewards.
    #[serde(default = "default_significant_focus_seconds")]
    pub significant_focus_seconds: i64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/focusquest/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

// Default functions
fn default_focus_minutes() -> u32 {
    25
}
fn default_short_break_minutes() -> u32 {
    5
}
fn default_long_break_minutes() -> u32 {
    15
}
fn default_focuses_before_long_break() -> u32 {
    4
}
fn default_minimum_tail_minutes() -> u32 {
    10
}
fn default_focus_xp() -> String {
    "10".into()
}
fn default_focus_coins() -> String {
    "2".into()
}
fn default_growth_points_per_focus() -> i64 {
    2
}
fn default_significant_focus_seconds() -> i64 {
    600
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            focuses_before_long_break: default_focuses_before_long_break(),
            minimum_tail_minutes: default_minimum_tail_minutes(),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            focus_xp: default_focus_xp(),
            focus_coins: default_focus_coins(),
            growth_points_per_focus: default_growth_points_per_focus(),
            significant_focus_seconds: default_significant_focus_seconds(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            rewards: RewardsConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown_key = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".to_string(),
        };
        let bad_value = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown_key());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown_key)?;
                let existing = obj.get(part).ok_or_else(unknown_key)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| bad_value(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    bad_value(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(bad_value(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| bad_value(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown_key)?;
        }

        Err(unknown_key())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist. Returns error if the key
    /// is unknown or the value cannot be parsed into the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Schedule parameters for the phase cycle generator.
    pub fn schedule_params(&self) -> ScheduleParams {
        ScheduleParams {
            focus_minutes: u64::from(self.schedule.focus_minutes),
            short_break_minutes: u64::from(self.schedule.short_break_minutes),
            long_break_minutes: u64::from(self.schedule.long_break_minutes),
            focuses_before_long_break: self.schedule.focuses_before_long_break,
            minimum_tail_minutes: u64::from(self.schedule.minimum_tail_minutes),
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
