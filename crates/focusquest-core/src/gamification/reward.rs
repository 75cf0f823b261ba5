//! Reward specifications and the stored-value grammar.
//!
//! Reward rows keep their magnitude as a string evaluated against the
//! profile's level at application time:
//!
//! - `LEVEL*n`  -> level * n
//! - `BASE*b*f` -> floor(b * f^(level-1)), factor >= 0
//! - plain int  -> the value itself
//!
//! All results clamp at zero; anything unparseable is a validation error
//! and aborts the cascade.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardKind {
    Coins,
    Experience,
    Badge,
    Plant,
    Theme,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Coins => "COINS",
            RewardKind::Experience => "EXPERIENCE",
            RewardKind::Badge => "BADGE",
            RewardKind::Plant => "PLANT",
            RewardKind::Theme => "THEME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COINS" => Some(RewardKind::Coins),
            "EXPERIENCE" => Some(RewardKind::Experience),
            "BADGE" => Some(RewardKind::Badge),
            "PLANT" => Some(RewardKind::Plant),
            "THEME" => Some(RewardKind::Theme),
            _ => None,
        }
    }
}

/// A stored reward row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub kind: RewardKind,
    /// Value string in the grammar above. For BADGE the badge id, for
    /// PLANT the plant type; ignored for THEME.
    pub value: String,
}

/// What applying one reward contributed. Deltas are accumulated by the
/// orchestrator into a single profile update; the pipeline itself never
/// writes the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardApplicationResult {
    pub delta_xp: i64,
    pub delta_coins: i64,
}

impl RewardApplicationResult {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.delta_xp == 0 && self.delta_coins == 0
    }
}

impl std::ops::AddAssign for RewardApplicationResult {
    fn add_assign(&mut self, rhs: Self) {
        self.delta_xp += rhs.delta_xp;
        self.delta_coins += rhs.delta_coins;
    }
}

/// Evaluate a reward value string against a profile level.
pub fn evaluate_value(value: &str, level: i32) -> Result<i64> {
    let trimmed = value.trim().to_uppercase();
    let invalid = |message: String| {
        CoreError::Validation(ValidationError::InvalidValue {
            field: "reward_value".to_string(),
            message,
        })
    };
    let parts: Vec<&str> = trimmed.split('*').collect();
    match parts.as_slice() {
        ["LEVEL", multiplier] => {
            let multiplier: i64 = multiplier
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad LEVEL multiplier in '{value}'")))?;
            Ok((i64::from(level) * multiplier).max(0))
        }
        ["BASE", base, factor] => {
            let base: i64 = base
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad BASE amount in '{value}'")))?;
            let factor: f64 = factor
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad BASE factor in '{value}'")))?;
            if factor < 0.0 {
                return Err(invalid(format!("negative BASE factor in '{value}'")));
            }
            let scaled = base as f64 * factor.powi(level - 1);
            Ok((scaled as i64).max(0))
        }
        _ => {
            let plain: i64 = trimmed
                .parse()
                .map_err(|_| invalid(format!("unrecognized reward value '{value}'")))?;
            Ok(plain.max(0))
        }
    }
}
