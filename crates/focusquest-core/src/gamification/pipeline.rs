//! Reward application: single rewards, domain events against challenge
//! rules, and growth points.
//!
//! The pipeline runs over one connection, usually inside the completion
//! transaction. It never writes the profile; XP and coin deltas are
//! returned for the orchestrator to accumulate into a single update.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{GamificationError, Result};
use crate::storage::gamification_db;

use super::challenge::{
    progress_is_current, rule_matches_event, ChallengeProgress, ChallengeRule, ChallengeStatus,
    GamificationEvent,
};
use super::growth;
use super::reward::{evaluate_value, Reward, RewardApplicationResult, RewardKind};

pub struct RewardPipeline<'a> {
    conn: &'a Connection,
}

impl<'a> RewardPipeline<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply a single reward against a profile at `level`.
    ///
    /// COINS and EXPERIENCE evaluate the value string and return the
    /// delta. BADGE inserts an earned-badge link, PLANT unlocks a new
    /// stage-0 plant, THEME is a logged grant; those three return zero
    /// deltas.
    pub fn apply(
        &self,
        gamification_id: i64,
        reward: &Reward,
        level: i32,
        now: DateTime<Utc>,
    ) -> Result<RewardApplicationResult> {
        match reward.kind {
            RewardKind::Coins => Ok(RewardApplicationResult {
                delta_xp: 0,
                delta_coins: evaluate_value(&reward.value, level)?,
            }),
            RewardKind::Experience => Ok(RewardApplicationResult {
                delta_xp: evaluate_value(&reward.value, level)?,
                delta_coins: 0,
            }),
            RewardKind::Badge => {
                gamification_db::insert_badge(self.conn, gamification_id, &reward.value, now)?;
                debug!(gamification_id, badge = %reward.value, "badge earned");
                Ok(RewardApplicationResult::zero())
            }
            RewardKind::Plant => {
                // New plants start a day unwatered.
                let last_watered = now - Duration::days(1);
                gamification_db::insert_plant(
                    self.conn,
                    gamification_id,
                    &reward.value,
                    last_watered,
                )?;
                debug!(gamification_id, plant_type = %reward.value, "plant unlocked");
                Ok(RewardApplicationResult::zero())
            }
            RewardKind::Theme => {
                info!(gamification_id, theme = %reward.value, "theme reward granted");
                Ok(RewardApplicationResult::zero())
            }
        }
    }

    /// Feed a domain event through every active challenge rule.
    ///
    /// Matching rules get their progress incremented (capped at the
    /// target; progress from an expired period restarts at zero). The
    /// first crossing of the target marks the rule completed and applies
    /// its reward; when every rule of the challenge is complete for the
    /// current period the challenge flips to COMPLETED.
    pub fn apply_event(
        &self,
        gamification_id: i64,
        level: i32,
        event: &GamificationEvent,
        now: DateTime<Utc>,
    ) -> Result<RewardApplicationResult> {
        let mut total = RewardApplicationResult::zero();
        for rule in gamification_db::active_rules(self.conn)? {
            if !rule_matches_event(&rule, event) {
                continue;
            }
            let existing =
                gamification_db::get_progress(self.conn, gamification_id, rule.challenge_id, rule.id)?;
            let (progress, completed) = match existing {
                Some(p) if progress_is_current(rule.period, p.updated_at, now) => {
                    (p.progress, p.completed)
                }
                _ => (0, false),
            };
            if completed {
                continue;
            }

            let progress = (progress + 1).min(rule.target);
            let crossed = progress >= rule.target;
            gamification_db::upsert_progress(
                self.conn,
                &ChallengeProgress {
                    gamification_id,
                    challenge_id: rule.challenge_id,
                    rule_id: rule.id,
                    progress,
                    completed: crossed,
                    updated_at: now,
                },
            )?;

            if crossed {
                info!(
                    gamification_id,
                    challenge_id = rule.challenge_id,
                    rule_id = rule.id,
                    "challenge rule completed"
                );
                total += self.apply_rule_reward(gamification_id, &rule, level, now)?;
                if self.challenge_complete(gamification_id, rule.challenge_id, now)? {
                    gamification_db::set_challenge_status(
                        self.conn,
                        rule.challenge_id,
                        ChallengeStatus::Completed,
                    )?;
                    info!(challenge_id = rule.challenge_id, "challenge completed");
                }
            }
        }
        Ok(total)
    }

    /// Apply growth points to one plant, persisting only when the plant
    /// actually changed. Callers treat failures as best-effort.
    pub fn apply_growth_points(&self, plant_id: i64, points: i64) -> Result<()> {
        let mut plant = gamification_db::get_plant(self.conn, plant_id)?
            .ok_or(GamificationError::PlantNotFound { plant_id })?;
        if growth::apply_points(&mut plant, points) {
            gamification_db::update_plant(self.conn, &plant)?;
            debug!(
                plant_id,
                stage = plant.growth_stage,
                points = plant.growth_points,
                "growth points applied"
            );
        }
        Ok(())
    }

    /// The rule's reward, or its fallback when the primary is a badge
    /// the profile already owns. No fallback means a zero-delta no-op.
    fn apply_rule_reward(
        &self,
        gamification_id: i64,
        rule: &ChallengeRule,
        level: i32,
        now: DateTime<Utc>,
    ) -> Result<RewardApplicationResult> {
        let Some(reward_id) = rule.reward_id else {
            return Ok(RewardApplicationResult::zero());
        };
        let reward = self.load_reward(reward_id)?;
        if !self.badge_already_owned(gamification_id, &reward)? {
            return self.apply(gamification_id, &reward, level, now);
        }
        debug!(
            gamification_id,
            rule_id = rule.id,
            badge = %reward.value,
            "badge already owned, consulting fallback"
        );
        let Some(fallback_id) = rule.fallback_reward_id else {
            return Ok(RewardApplicationResult::zero());
        };
        let fallback = self.load_reward(fallback_id)?;
        if self.badge_already_owned(gamification_id, &fallback)? {
            return Ok(RewardApplicationResult::zero());
        }
        self.apply(gamification_id, &fallback, level, now)
    }

    fn load_reward(&self, reward_id: i64) -> Result<Reward> {
        gamification_db::get_reward(self.conn, reward_id)?
            .ok_or_else(|| GamificationError::RewardNotFound { reward_id }.into())
    }

    fn badge_already_owned(&self, gamification_id: i64, reward: &Reward) -> Result<bool> {
        if reward.kind != RewardKind::Badge {
            return Ok(false);
        }
        gamification_db::has_badge(self.conn, gamification_id, &reward.value)
    }

    fn challenge_complete(
        &self,
        gamification_id: i64,
        challenge_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rules = gamification_db::rules_for_challenge(self.conn, challenge_id)?;
        if rules.is_empty() {
            return Ok(false);
        }
        for rule in rules {
            let done = gamification_db::get_progress(
                self.conn,
                gamification_id,
                challenge_id,
                rule.id,
            )?
            .is_some_and(|p| p.completed && progress_is_current(rule.period, p.updated_at, now));
            if !done {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::gamification::challenge::{RulePeriod, RuleType};
    use crate::storage::{gamification_db, Database};
    use chrono::Utc;

    fn pomodoro(duration_secs: u64) -> GamificationEvent {
        GamificationEvent::PomodoroCompleted {
            session_id: 1,
            duration_secs,
            task_id: 7,
        }
    }

    #[test]
    fn coins_and_experience_evaluate_against_level() {
        let db = Database::open_memory().unwrap();
        let pipeline = RewardPipeline::new(db.conn());
        let now = Utc::now();

        let coins = Reward {
            id: 1,
            name: "c".into(),
            description: String::new(),
            kind: RewardKind::Coins,
            value: "LEVEL*5".into(),
        };
        let xp = Reward {
            kind: RewardKind::Experience,
            value: "BASE*10*1.5".into(),
            ..coins.clone()
        };

        let applied = pipeline.apply(1, &coins, 3, now).unwrap();
        assert_eq!(applied.delta_coins, 15);
        assert_eq!(applied.delta_xp, 0);

        let applied = pipeline.apply(1, &xp, 3, now).unwrap();
        assert_eq!(applied.delta_xp, 22);
        assert_eq!(applied.delta_coins, 0);
    }

    #[test]
    fn plant_rewards_unlock_a_backdated_plant() {
        let db = Database::open_memory().unwrap();
        let pipeline = RewardPipeline::new(db.conn());
        let now = Utc::now();
        let gid = gamification_db::ensure_profile(db.conn(), 1, now).unwrap();

        let reward = Reward {
            id: 1,
            name: "sapling".into(),
            description: String::new(),
            kind: RewardKind::Plant,
            value: "oak".into(),
        };
        let applied = pipeline.apply(gid, &reward, 1, now).unwrap();
        assert!(applied.is_zero());

        let plants = gamification_db::list_plants(db.conn(), gid).unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].plant_type, "oak");
        assert_eq!(plants[0].growth_stage, 0);
        assert!(plants[0].last_watered < now);
    }

    #[test]
    fn rule_completes_on_target_and_flips_the_challenge() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let gid = gamification_db::ensure_profile(db.conn(), 1, now).unwrap();
        let reward_id = gamification_db::insert_reward(
            db.conn(),
            "coins",
            "",
            RewardKind::Coins,
            "LEVEL*10",
        )
        .unwrap();
        let challenge_id = gamification_db::insert_challenge(
            db.conn(),
            "two sessions",
            "",
            ChallengeStatus::Active,
        )
        .unwrap();
        let rule_id = gamification_db::insert_rule(
            db.conn(),
            challenge_id,
            RuleType::PomodoroSession,
            2,
            RulePeriod::Daily,
            None,
            Some(reward_id),
            None,
        )
        .unwrap();

        let pipeline = RewardPipeline::new(db.conn());
        let first = pipeline.apply_event(gid, 1, &pomodoro(1500), now).unwrap();
        assert!(first.is_zero());
        let progress = gamification_db::get_progress(db.conn(), gid, challenge_id, rule_id)
            .unwrap()
            .unwrap();
        assert_eq!(progress.progress, 1);
        assert!(!progress.completed);

        let second = pipeline.apply_event(gid, 1, &pomodoro(1500), now).unwrap();
        assert_eq!(second.delta_coins, 10);

        let challenges = gamification_db::list_challenges(db.conn()).unwrap();
        assert_eq!(challenges[0].status, ChallengeStatus::Completed);

        // A completed rule doesn't pay out again inside the same period.
        let third = pipeline.apply_event(gid, 1, &pomodoro(1500), now).unwrap();
        assert!(third.is_zero());
    }

    #[test]
    fn stale_period_progress_restarts_from_zero() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let gid = gamification_db::ensure_profile(db.conn(), 1, now).unwrap();
        let challenge_id = gamification_db::insert_challenge(
            db.conn(),
            "daily",
            "",
            ChallengeStatus::Active,
        )
        .unwrap();
        let rule_id = gamification_db::insert_rule(
            db.conn(),
            challenge_id,
            RuleType::PomodoroSession,
            3,
            RulePeriod::Daily,
            None,
            None,
            None,
        )
        .unwrap();
        // Yesterday's run got to 2 of 3. It no longer counts.
        gamification_db::upsert_progress(
            db.conn(),
            &ChallengeProgress {
                gamification_id: gid,
                challenge_id,
                rule_id,
                progress: 2,
                completed: false,
                updated_at: now - Duration::days(2),
            },
        )
        .unwrap();

        let pipeline = RewardPipeline::new(db.conn());
        pipeline.apply_event(gid, 1, &pomodoro(1500), now).unwrap();
        let progress = gamification_db::get_progress(db.conn(), gid, challenge_id, rule_id)
            .unwrap()
            .unwrap();
        assert_eq!(progress.progress, 1);
    }

    #[test]
    fn owned_badge_falls_back_to_the_consolation_reward() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let gid = gamification_db::ensure_profile(db.conn(), 1, now).unwrap();
        let badge = gamification_db::insert_reward(
            db.conn(),
            "badge",
            "",
            RewardKind::Badge,
            "first-steps",
        )
        .unwrap();
        let consolation =
            gamification_db::insert_reward(db.conn(), "coins", "", RewardKind::Coins, "25")
                .unwrap();
        let challenge_id = gamification_db::insert_challenge(
            db.conn(),
            "first",
            "",
            ChallengeStatus::Active,
        )
        .unwrap();
        gamification_db::insert_rule(
            db.conn(),
            challenge_id,
            RuleType::TaskCompletion,
            1,
            RulePeriod::Event,
            None,
            Some(badge),
            Some(consolation),
        )
        .unwrap();
        gamification_db::insert_badge(db.conn(), gid, "first-steps", now).unwrap();

        let pipeline = RewardPipeline::new(db.conn());
        let event = GamificationEvent::TaskCompleted {
            task_id: 3,
            tags: vec![],
        };
        let applied = pipeline.apply_event(gid, 1, &event, now).unwrap();
        assert_eq!(applied.delta_coins, 25);
        assert_eq!(applied.delta_xp, 0);
    }

    #[test]
    fn duration_conditions_filter_events() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let gid = gamification_db::ensure_profile(db.conn(), 1, now).unwrap();
        let challenge_id = gamification_db::insert_challenge(
            db.conn(),
            "long sessions",
            "",
            ChallengeStatus::Active,
        )
        .unwrap();
        let rule_id = gamification_db::insert_rule(
            db.conn(),
            challenge_id,
            RuleType::PomodoroSession,
            5,
            RulePeriod::Weekly,
            Some(r#"{"minDurationMinutes":25}"#),
            None,
            None,
        )
        .unwrap();

        let pipeline = RewardPipeline::new(db.conn());
        pipeline.apply_event(gid, 1, &pomodoro(600), now).unwrap();
        assert!(gamification_db::get_progress(db.conn(), gid, challenge_id, rule_id)
            .unwrap()
            .is_none());

        pipeline.apply_event(gid, 1, &pomodoro(1500), now).unwrap();
        let progress = gamification_db::get_progress(db.conn(), gid, challenge_id, rule_id)
            .unwrap()
            .unwrap();
        assert_eq!(progress.progress, 1);
    }

    #[test]
    fn growth_points_on_a_missing_plant_are_an_error() {
        let db = Database::open_memory().unwrap();
        let pipeline = RewardPipeline::new(db.conn());
        let result = pipeline.apply_growth_points(999, 2);
        assert!(matches!(
            result,
            Err(CoreError::Gamification(GamificationError::PlantNotFound { plant_id: 999 }))
        ));

        let gid = gamification_db::ensure_profile(db.conn(), 1, Utc::now()).unwrap();
        let plant_id =
            gamification_db::insert_plant(db.conn(), gid, "oak", Utc::now()).unwrap();
        pipeline.apply_growth_points(plant_id, 60).unwrap();
        let plant = gamification_db::get_plant(db.conn(), plant_id).unwrap().unwrap();
        assert_eq!(plant.growth_stage, 1);
        assert_eq!(plant.growth_points, 60);
    }
}
