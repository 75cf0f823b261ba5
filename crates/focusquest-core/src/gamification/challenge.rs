//! Challenges, their rules, and progress accounting.
//!
//! A challenge owns one or more rules. Each rule names the event type it
//! reacts to, an optional JSON condition, a target count, a period, and
//! its reward decision table (primary reward plus a fallback consulted
//! when the primary is a badge the profile already owns). Progress from
//! an expired period counts as zero, so a completed DAILY rule can be
//! re-earned the next day.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Domain event fed into the reward pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GamificationEvent {
    TaskCompleted {
        task_id: i64,
        tags: Vec<String>,
    },
    PomodoroCompleted {
        session_id: i64,
        duration_secs: u64,
        task_id: i64,
    },
    StreakUpdated {
        new_value: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
    Active,
    Completed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "ACTIVE",
            ChallengeStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(ChallengeStatus::Active),
            "COMPLETED" => Some(ChallengeStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    TaskCompletion,
    PomodoroSession,
    DailyStreak,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::TaskCompletion => "TASK_COMPLETION",
            RuleType::PomodoroSession => "POMODORO_SESSION",
            RuleType::DailyStreak => "DAILY_STREAK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TASK_COMPLETION" => Some(RuleType::TaskCompletion),
            "POMODORO_SESSION" => Some(RuleType::PomodoroSession),
            "DAILY_STREAK" => Some(RuleType::DailyStreak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RulePeriod {
    Once,
    Event,
    Daily,
    Weekly,
    Monthly,
}

impl RulePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RulePeriod::Once => "ONCE",
            RulePeriod::Event => "EVENT",
            RulePeriod::Daily => "DAILY",
            RulePeriod::Weekly => "WEEKLY",
            RulePeriod::Monthly => "MONTHLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ONCE" => Some(RulePeriod::Once),
            "EVENT" => Some(RulePeriod::Event),
            "DAILY" => Some(RulePeriod::Daily),
            "WEEKLY" => Some(RulePeriod::Weekly),
            "MONTHLY" => Some(RulePeriod::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: ChallengeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRule {
    pub id: i64,
    pub challenge_id: i64,
    pub rule_type: RuleType,
    pub target: i64,
    pub period: RulePeriod,
    /// Optional JSON condition; a malformed condition disqualifies the
    /// rule rather than failing the cascade.
    pub condition_json: Option<String>,
    pub reward_id: Option<i64>,
    /// Consulted when the primary reward is a badge already owned.
    pub fallback_reward_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub gamification_id: i64,
    pub challenge_id: i64,
    pub rule_id: i64,
    pub progress: i64,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// Does this rule react to this event, conditions included?
pub fn rule_matches_event(rule: &ChallengeRule, event: &GamificationEvent) -> bool {
    let type_matches = matches!(
        (rule.rule_type, event),
        (RuleType::TaskCompletion, GamificationEvent::TaskCompleted { .. })
            | (RuleType::PomodoroSession, GamificationEvent::PomodoroCompleted { .. })
            | (RuleType::DailyStreak, GamificationEvent::StreakUpdated { .. })
    );
    if !type_matches {
        return false;
    }
    conditions_hold(rule, event)
}

fn conditions_hold(rule: &ChallengeRule, event: &GamificationEvent) -> bool {
    let raw = match rule.condition_json.as_deref() {
        None => return true,
        Some(s) if s.trim().is_empty() => return true,
        Some(s) => s,
    };
    let cond: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            warn!(rule_id = rule.id, error = %err, "malformed challenge rule condition, skipping rule");
            return false;
        }
    };
    match event {
        GamificationEvent::TaskCompleted { tags, .. } => {
            match cond.get("tags").and_then(|v| v.as_array()) {
                None => true,
                Some(required) => {
                    let have: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
                    required.iter().all(|v| {
                        v.as_str()
                            .is_some_and(|t| have.contains(&t.to_lowercase()))
                    })
                }
            }
        }
        GamificationEvent::PomodoroCompleted { duration_secs, .. } => {
            match cond.get("minDurationMinutes") {
                None => true,
                Some(v) => v
                    .as_i64()
                    .is_some_and(|m| *duration_secs as i64 >= m.saturating_mul(60)),
            }
        }
        GamificationEvent::StreakUpdated { new_value } => {
            let min_ok = match cond.get("minStreak") {
                None => true,
                Some(v) => v.as_i64().is_some_and(|m| i64::from(*new_value) >= m),
            };
            let exact_ok = match cond.get("exactStreak") {
                None => true,
                Some(v) => v.as_i64().is_some_and(|m| i64::from(*new_value) == m),
            };
            min_ok && exact_ok
        }
    }
}

/// Whether a progress row last updated at `last_updated` still belongs to
/// the current period at `now`.
pub fn progress_is_current(
    period: RulePeriod,
    last_updated: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    match period {
        RulePeriod::Once | RulePeriod::Event => true,
        RulePeriod::Daily => last_updated.date_naive() == now.date_naive(),
        RulePeriod::Weekly => {
            let a = last_updated.iso_week();
            let b = now.iso_week();
            a.week() == b.week() && a.year() == b.year()
        }
        RulePeriod::Monthly => {
            last_updated.month() == now.month() && last_updated.year() == now.year()
        }
    }
}
