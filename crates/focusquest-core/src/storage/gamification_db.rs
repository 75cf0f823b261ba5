//! Gamification queries: profiles, rewards, badges, plants, challenges
//! and the history ledger. All functions take `&Connection` so the
//! completion cascade can run them inside one transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{DatabaseError, Result};
use crate::gamification::challenge::{
    Challenge, ChallengeProgress, ChallengeRule, ChallengeStatus, RulePeriod, RuleType,
};
use crate::gamification::growth::Plant;
use crate::gamification::profile::{GamificationProfile, HistoryEntry, HistoryReason};
use crate::gamification::reward::{Reward, RewardKind};

use super::parse_datetime_fallback;

const SELECTED_PLANT_KEY: &str = "selected_plant_id";

// ── Profiles ─────────────────────────────────────────────────────────

/// Get the profile for a user, creating a fresh level-1 profile if none
/// exists yet. Returns the gamification id.
pub fn ensure_profile(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> Result<i64> {
    if let Some(profile) = get_profile_by_user(conn, user_id)? {
        return Ok(profile.id);
    }
    conn.execute(
        "INSERT INTO gamification (user_id, last_active) VALUES (?1, ?2)",
        params![user_id, now.to_rfc3339()],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn get_profile(conn: &Connection, gamification_id: i64) -> Result<Option<GamificationProfile>> {
    conn.query_row(
        "SELECT id, user_id, level, experience, coins, max_experience_for_level,
                last_active, current_streak, last_claimed_date, max_streak
         FROM gamification WHERE id = ?1",
        params![gamification_id],
        row_to_profile,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

pub fn get_profile_by_user(conn: &Connection, user_id: i64) -> Result<Option<GamificationProfile>> {
    conn.query_row(
        "SELECT id, user_id, level, experience, coins, max_experience_for_level,
                last_active, current_streak, last_claimed_date, max_streak
         FROM gamification WHERE user_id = ?1",
        params![user_id],
        row_to_profile,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

/// Write the progression fields the cascade owns: experience, coins and
/// last_active. Level recomputation belongs to an external collaborator.
pub fn update_profile_progress(
    conn: &Connection,
    gamification_id: i64,
    experience: i64,
    coins: i64,
    last_active: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE gamification SET experience = ?1, coins = ?2, last_active = ?3 WHERE id = ?4",
        params![experience, coins, last_active.to_rfc3339(), gamification_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn update_profile_last_active(
    conn: &Connection,
    gamification_id: i64,
    last_active: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE gamification SET last_active = ?1 WHERE id = ?2",
        params![last_active.to_rfc3339(), gamification_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

fn row_to_profile(
    row: &rusqlite::Row,
) -> std::result::Result<GamificationProfile, rusqlite::Error> {
    let last_active: String = row.get(6)?;
    let last_claimed: Option<String> = row.get(8)?;
    Ok(GamificationProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        level: row.get(2)?,
        experience: row.get(3)?,
        coins: row.get(4)?,
        max_experience_for_level: row.get(5)?,
        last_active: parse_datetime_fallback(&last_active),
        current_streak: row.get(7)?,
        last_claimed_date: last_claimed.as_deref().map(parse_datetime_fallback),
        max_streak: row.get(9)?,
    })
}

// ── Rewards ──────────────────────────────────────────────────────────

pub fn insert_reward(
    conn: &Connection,
    name: &str,
    description: &str,
    kind: RewardKind,
    value: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO rewards (name, description, reward_type, reward_value)
         VALUES (?1, ?2, ?3, ?4)",
        params![name, description, kind.as_str(), value],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn get_reward(conn: &Connection, reward_id: i64) -> Result<Option<Reward>> {
    conn.query_row(
        "SELECT id, name, description, reward_type, reward_value
         FROM rewards WHERE id = ?1",
        params![reward_id],
        |row| {
            let kind_str: String = row.get(3)?;
            Ok(Reward {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                kind: RewardKind::parse(&kind_str).unwrap_or(RewardKind::Coins),
                value: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

// ── Badges ───────────────────────────────────────────────────────────

pub fn has_badge(conn: &Connection, gamification_id: i64, badge_id: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM earned_badges WHERE gamification_id = ?1 AND badge_id = ?2",
            params![gamification_id, badge_id],
            |row| row.get(0),
        )
        .map_err(DatabaseError::from)?;
    Ok(count > 0)
}

pub fn insert_badge(
    conn: &Connection,
    gamification_id: i64,
    badge_id: &str,
    earned_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO earned_badges (gamification_id, badge_id, earned_at) VALUES (?1, ?2, ?3)",
        params![gamification_id, badge_id, earned_at.to_rfc3339()],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

// ── Garden plants ────────────────────────────────────────────────────

pub fn insert_plant(
    conn: &Connection,
    gamification_id: i64,
    plant_type: &str,
    last_watered: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO garden_plants (gamification_id, plant_type, last_watered)
         VALUES (?1, ?2, ?3)",
        params![gamification_id, plant_type, last_watered.to_rfc3339()],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn get_plant(conn: &Connection, plant_id: i64) -> Result<Option<Plant>> {
    conn.query_row(
        "SELECT id, gamification_id, plant_type, growth_stage, growth_points, last_watered
         FROM garden_plants WHERE id = ?1",
        params![plant_id],
        row_to_plant,
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

pub fn list_plants(conn: &Connection, gamification_id: i64) -> Result<Vec<Plant>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, gamification_id, plant_type, growth_stage, growth_points, last_watered
             FROM garden_plants WHERE gamification_id = ?1 ORDER BY id",
        )
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map(params![gamification_id], row_to_plant)
        .map_err(DatabaseError::from)?;
    let mut plants = Vec::new();
    for row in rows {
        plants.push(row.map_err(DatabaseError::from)?);
    }
    Ok(plants)
}

pub fn update_plant(conn: &Connection, plant: &Plant) -> Result<()> {
    conn.execute(
        "UPDATE garden_plants
         SET growth_stage = ?1, growth_points = ?2, last_watered = ?3
         WHERE id = ?4",
        params![
            plant.growth_stage,
            plant.growth_points,
            plant.last_watered.to_rfc3339(),
            plant.id,
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

/// Plant currently receiving growth points, stored in the kv table.
pub fn selected_plant_id(conn: &Connection) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![SELECTED_PLANT_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(DatabaseError::from)?;
    Ok(value.and_then(|v| v.parse().ok()))
}

pub fn set_selected_plant(conn: &Connection, plant_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        params![SELECTED_PLANT_KEY, plant_id.to_string()],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

fn row_to_plant(row: &rusqlite::Row) -> std::result::Result<Plant, rusqlite::Error> {
    let last_watered: String = row.get(5)?;
    Ok(Plant {
        id: row.get(0)?,
        gamification_id: row.get(1)?,
        plant_type: row.get(2)?,
        growth_stage: row.get(3)?,
        growth_points: row.get(4)?,
        last_watered: parse_datetime_fallback(&last_watered),
    })
}

// ── History ──────────────────────────────────────────────────────────

pub fn append_history(
    conn: &Connection,
    gamification_id: i64,
    timestamp: DateTime<Utc>,
    xp_change: i64,
    coins_change: i64,
    reason: HistoryReason,
    related_entity_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO gamification_history
            (gamification_id, timestamp, xp_change, coins_change, reason, related_entity_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            gamification_id,
            timestamp.to_rfc3339(),
            xp_change,
            coins_change,
            reason.as_str(),
            related_entity_id,
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn list_history(
    conn: &Connection,
    gamification_id: i64,
    limit: usize,
) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, gamification_id, timestamp, xp_change, coins_change, reason,
                    related_entity_id
             FROM gamification_history
             WHERE gamification_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map(params![gamification_id, limit as i64], |row| {
            let timestamp: String = row.get(2)?;
            let reason: String = row.get(5)?;
            Ok(HistoryEntry {
                id: row.get(0)?,
                gamification_id: row.get(1)?,
                timestamp: parse_datetime_fallback(&timestamp),
                xp_change: row.get(3)?,
                coins_change: row.get(4)?,
                reason: HistoryReason::parse(&reason).unwrap_or(HistoryReason::PomodoroCompleted),
                related_entity_id: row.get(6)?,
            })
        })
        .map_err(DatabaseError::from)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(DatabaseError::from)?);
    }
    Ok(entries)
}

// ── Challenges ───────────────────────────────────────────────────────

pub fn insert_challenge(
    conn: &Connection,
    name: &str,
    description: &str,
    status: ChallengeStatus,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO challenges (name, description, status) VALUES (?1, ?2, ?3)",
        params![name, description, status.as_str()],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_rule(
    conn: &Connection,
    challenge_id: i64,
    rule_type: RuleType,
    target: i64,
    period: RulePeriod,
    condition_json: Option<&str>,
    reward_id: Option<i64>,
    fallback_reward_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO challenge_rules
            (challenge_id, rule_type, target, period, condition_json, reward_id, fallback_reward_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            challenge_id,
            rule_type.as_str(),
            target,
            period.as_str(),
            condition_json,
            reward_id,
            fallback_reward_id,
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(conn.last_insert_rowid())
}

pub fn list_challenges(conn: &Connection) -> Result<Vec<Challenge>> {
    let mut stmt = conn
        .prepare("SELECT id, name, description, status FROM challenges ORDER BY id")
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map([], row_to_challenge)
        .map_err(DatabaseError::from)?;
    let mut challenges = Vec::new();
    for row in rows {
        challenges.push(row.map_err(DatabaseError::from)?);
    }
    Ok(challenges)
}

/// Rules belonging to ACTIVE challenges, the working set for event
/// processing.
pub fn active_rules(conn: &Connection) -> Result<Vec<ChallengeRule>> {
    let mut stmt = conn
        .prepare(
            "SELECT r.id, r.challenge_id, r.rule_type, r.target, r.period,
                    r.condition_json, r.reward_id, r.fallback_reward_id
             FROM challenge_rules r
             JOIN challenges c ON c.id = r.challenge_id
             WHERE c.status = 'ACTIVE'
             ORDER BY r.id",
        )
        .map_err(DatabaseError::from)?;
    let rules = collect_rules(stmt.query_map([], row_to_rule).map_err(DatabaseError::from)?);
    rules
}

pub fn rules_for_challenge(conn: &Connection, challenge_id: i64) -> Result<Vec<ChallengeRule>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, challenge_id, rule_type, target, period,
                    condition_json, reward_id, fallback_reward_id
             FROM challenge_rules WHERE challenge_id = ?1 ORDER BY id",
        )
        .map_err(DatabaseError::from)?;
    let rules = collect_rules(
        stmt.query_map(params![challenge_id], row_to_rule)
            .map_err(DatabaseError::from)?,
    );
    rules
}

pub fn set_challenge_status(
    conn: &Connection,
    challenge_id: i64,
    status: ChallengeStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE challenges SET status = ?1 WHERE id = ?2",
        params![status.as_str(), challenge_id],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

pub fn get_progress(
    conn: &Connection,
    gamification_id: i64,
    challenge_id: i64,
    rule_id: i64,
) -> Result<Option<ChallengeProgress>> {
    conn.query_row(
        "SELECT gamification_id, challenge_id, rule_id, progress, completed, updated_at
         FROM challenge_progress
         WHERE gamification_id = ?1 AND challenge_id = ?2 AND rule_id = ?3",
        params![gamification_id, challenge_id, rule_id],
        |row| {
            let updated_at: String = row.get(5)?;
            Ok(ChallengeProgress {
                gamification_id: row.get(0)?,
                challenge_id: row.get(1)?,
                rule_id: row.get(2)?,
                progress: row.get(3)?,
                completed: row.get::<_, i64>(4)? != 0,
                updated_at: parse_datetime_fallback(&updated_at),
            })
        },
    )
    .optional()
    .map_err(|e| DatabaseError::from(e).into())
}

pub fn upsert_progress(conn: &Connection, progress: &ChallengeProgress) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO challenge_progress
            (gamification_id, challenge_id, rule_id, progress, completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            progress.gamification_id,
            progress.challenge_id,
            progress.rule_id,
            progress.progress,
            progress.completed as i64,
            progress.updated_at.to_rfc3339(),
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

fn row_to_challenge(row: &rusqlite::Row) -> std::result::Result<Challenge, rusqlite::Error> {
    let status: String = row.get(3)?;
    Ok(Challenge {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: ChallengeStatus::parse(&status).unwrap_or(ChallengeStatus::Active),
    })
}

fn row_to_rule(row: &rusqlite::Row) -> std::result::Result<ChallengeRule, rusqlite::Error> {
    let rule_type: String = row.get(2)?;
    let period: String = row.get(4)?;
    Ok(ChallengeRule {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        rule_type: RuleType::parse(&rule_type).unwrap_or(RuleType::TaskCompletion),
        target: row.get(3)?,
        period: RulePeriod::parse(&period).unwrap_or(RulePeriod::Once),
        condition_json: row.get(5)?,
        reward_id: row.get(6)?,
        fallback_reward_id: row.get(7)?,
    })
}

fn collect_rules(
    rows: impl Iterator<Item = std::result::Result<ChallengeRule, rusqlite::Error>>,
) -> Result<Vec<ChallengeRule>> {
    let mut rules = Vec::new();
    for row in rows {
        rules.push(row.map_err(DatabaseError::from)?);
    }
    Ok(rules)
}

// ── Builtin content ──────────────────────────────────────────────────

/// Seed the starter challenge pack into an empty database. Idempotent:
/// returns false without touching anything when challenges already exist.
pub fn seed_builtin_content(conn: &Connection) -> Result<bool> {
    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM challenges", [], |row| row.get(0))
        .map_err(DatabaseError::from)?;
    if existing > 0 {
        return Ok(false);
    }

    let daily_coins = insert_reward(
        conn,
        "Daily focus purse",
        "A coin purse that grows with your level.",
        RewardKind::Coins,
        "LEVEL*5",
    )?;
    let weekly_xp = insert_reward(
        conn,
        "Deep work dividend",
        "Compounding experience for a serious week.",
        RewardKind::Experience,
        "BASE*50*1.1",
    )?;
    let first_badge = insert_reward(
        conn,
        "First Steps badge",
        "Awarded for the very first completed task.",
        RewardKind::Badge,
        "first-steps",
    )?;
    let consolation_coins = insert_reward(
        conn,
        "Consolation coins",
        "Paid out when a badge was already earned.",
        RewardKind::Coins,
        "25",
    )?;
    let streak_badge = insert_reward(
        conn,
        "Week Streak badge",
        "Seven days in a row.",
        RewardKind::Badge,
        "week-streak",
    )?;
    let streak_coins = insert_reward(
        conn,
        "Streak coins",
        "Paid out when the streak badge was already earned.",
        RewardKind::Coins,
        "50",
    )?;
    let marathon_plant = insert_reward(
        conn,
        "Golden oak sapling",
        "A rare plant for a monthly marathon.",
        RewardKind::Plant,
        "golden_oak",
    )?;

    let daily = insert_challenge(
        conn,
        "Daily Focus",
        indoc::indoc! {"
            Complete four focus sessions of at least ten minutes today.
            Resets every day.
        "},
        ChallengeStatus::Active,
    )?;
    insert_rule(
        conn,
        daily,
        RuleType::PomodoroSession,
        4,
        RulePeriod::Daily,
        Some(r#"{"minDurationMinutes":10}"#),
        Some(daily_coins),
        None,
    )?;

    let weekly = insert_challenge(
        conn,
        "Deep Work Week",
        indoc::indoc! {"
            Twenty full-length focus sessions inside one calendar week.
            Long, uninterrupted blocks are the whole point.
        "},
        ChallengeStatus::Active,
    )?;
    insert_rule(
        conn,
        weekly,
        RuleType::PomodoroSession,
        20,
        RulePeriod::Weekly,
        Some(r#"{"minDurationMinutes":25}"#),
        Some(weekly_xp),
        None,
    )?;

    let first = insert_challenge(
        conn,
        "First Steps",
        indoc::indoc! {"
            Finish your first task. Everyone starts somewhere.
        "},
        ChallengeStatus::Active,
    )?;
    insert_rule(
        conn,
        first,
        RuleType::TaskCompletion,
        1,
        RulePeriod::Once,
        None,
        Some(first_badge),
        Some(consolation_coins),
    )?;

    let streak = insert_challenge(
        conn,
        "Streak Keeper",
        indoc::indoc! {"
            Keep a seven-day activity streak alive.
        "},
        ChallengeStatus::Active,
    )?;
    insert_rule(
        conn,
        streak,
        RuleType::DailyStreak,
        1,
        RulePeriod::Event,
        Some(r#"{"minStreak":7}"#),
        Some(streak_badge),
        Some(streak_coins),
    )?;

    let marathon = insert_challenge(
        conn,
        "Monthly Marathon",
        indoc::indoc! {"
            One hundred focus sessions in a calendar month earns a rare
            plant for the garden.
        "},
        ChallengeStatus::Active,
    )?;
    insert_rule(
        conn,
        marathon,
        RuleType::PomodoroSession,
        100,
        RulePeriod::Monthly,
        Some(r#"{"minDurationMinutes":10}"#),
        Some(marathon_plant),
        None,
    )?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn ensure_profile_creates_once() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let a = ensure_profile(db.conn(), 1, now).unwrap();
        let b = ensure_profile(db.conn(), 1, now).unwrap();
        assert_eq!(a, b);

        let profile = get_profile(db.conn(), a).unwrap().unwrap();
        assert_eq!(profile.level, 1);
        assert_eq!(profile.experience, 0);
        assert_eq!(profile.coins, 0);
    }

    #[test]
    fn progress_upsert_round_trips() {
        let db = Database::open_memory().unwrap();
        let progress = ChallengeProgress {
            gamification_id: 1,
            challenge_id: 2,
            rule_id: 3,
            progress: 4,
            completed: false,
            updated_at: Utc::now(),
        };
        upsert_progress(db.conn(), &progress).unwrap();
        let read = get_progress(db.conn(), 1, 2, 3).unwrap().unwrap();
        assert_eq!(read.progress, 4);
        assert!(!read.completed);

        let bumped = ChallengeProgress {
            progress: 5,
            completed: true,
            ..progress
        };
        upsert_progress(db.conn(), &bumped).unwrap();
        let read = get_progress(db.conn(), 1, 2, 3).unwrap().unwrap();
        assert_eq!(read.progress, 5);
        assert!(read.completed);
    }

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_memory().unwrap();
        assert!(seed_builtin_content(db.conn()).unwrap());
        assert!(!seed_builtin_content(db.conn()).unwrap());

        let challenges = list_challenges(db.conn()).unwrap();
        assert_eq!(challenges.len(), 5);
        let rules = active_rules(db.conn()).unwrap();
        assert_eq!(rules.len(), 5);
        // The badge rules carry fallbacks, the rest do not.
        let with_fallback = rules.iter().filter(|r| r.fallback_reward_id.is_some()).count();
        assert_eq!(with_fallback, 2);
    }

    #[test]
    fn selected_plant_round_trips_through_kv() {
        let db = Database::open_memory().unwrap();
        assert!(selected_plant_id(db.conn()).unwrap().is_none());
        let plant = insert_plant(db.conn(), 1, "oak", Utc::now()).unwrap();
        set_selected_plant(db.conn(), plant).unwrap();
        assert_eq!(selected_plant_id(db.conn()).unwrap(), Some(plant));
    }
}
