//! Gamification profile and history ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user progression profile. Experience and coins never drop below
/// zero; every write clamps. Level and max_experience_for_level are
/// recomputed by an external collaborator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub id: i64,
    pub user_id: i64,
    pub level: i32,
    pub experience: i64,
    pub coins: i64,
    pub max_experience_for_level: i64,
    pub last_active: DateTime<Utc>,
    pub current_streak: i32,
    pub last_claimed_date: Option<DateTime<Utc>>,
    pub max_streak: i32,
}

/// Why a history entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryReason {
    PomodoroCompleted,
    TaskCompleted,
    ChallengeCompleted,
    DailyReward,
    StorePurchase,
    SurpriseTaskCompleted,
}

impl HistoryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryReason::PomodoroCompleted => "POMODORO_COMPLETED",
            HistoryReason::TaskCompleted => "TASK_COMPLETED",
            HistoryReason::ChallengeCompleted => "CHALLENGE_COMPLETED",
            HistoryReason::DailyReward => "DAILY_REWARD",
            HistoryReason::StorePurchase => "STORE_PURCHASE",
            HistoryReason::SurpriseTaskCompleted => "SURPRISE_TASK_COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POMODORO_COMPLETED" => Some(HistoryReason::PomodoroCompleted),
            "TASK_COMPLETED" => Some(HistoryReason::TaskCompleted),
            "CHALLENGE_COMPLETED" => Some(HistoryReason::ChallengeCompleted),
            "DAILY_REWARD" => Some(HistoryReason::DailyReward),
            "STORE_PURCHASE" => Some(HistoryReason::StorePurchase),
            "SURPRISE_TASK_COMPLETED" => Some(HistoryReason::SurpriseTaskCompleted),
            _ => None,
        }
    }
}

/// Append-only ledger entry. One entry is written per completion whose
/// accumulated deltas are non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub gamification_id: i64,
    pub timestamp: DateTime<Utc>,
    pub xp_change: i64,
    pub coins_change: i64,
    pub reason: HistoryReason,
    pub related_entity_id: Option<i64>,
}
