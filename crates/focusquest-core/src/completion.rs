//! Completion orchestration.
//!
//! When a phase is confirmed (or a task force-completed), everything the
//! completion touches (session record, task and global statistics,
//! profile, challenge progress, growth, history) commits in one
//! transaction. Growth points and the history append are best-effort:
//! failures there are logged and swallowed without aborting the cascade.
//!
//! XP/coin deltas from every source accumulate into a single profile
//! write; the history ledger gets one entry per completion iff the
//! accumulated deltas are non-zero.

use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{DatabaseError, GamificationError, Result, SessionError};
use crate::gamification::challenge::GamificationEvent;
use crate::gamification::pipeline::RewardPipeline;
use crate::gamification::profile::HistoryReason;
use crate::gamification::reward::{evaluate_value, RewardApplicationResult};
use crate::session::InterruptedPhaseInfo;
use crate::storage::{gamification_db, session_db, stats_db, task_db, Database, RewardsConfig};
use crate::task::TaskStatus;
use crate::timer::PhaseKind;

pub struct CompletionOrchestrator<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    rewards: RewardsConfig,
}

impl<'a> CompletionOrchestrator<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock, rewards: RewardsConfig) -> Self {
        Self { db, clock, rewards }
    }

    /// Finalize one timed phase and run the reward cascade for it.
    ///
    /// Fatal when the session record is missing or already finalized;
    /// a significant focus phase additionally requires a profile. Any
    /// fatal error rolls back the whole completion.
    pub fn complete_phase(
        &self,
        session_id: i64,
        task_id: i64,
        kind: PhaseKind,
        actual_duration_secs: u64,
        interruptions: u32,
    ) -> Result<RewardApplicationResult> {
        self.db.with_transaction(|conn| {
            self.complete_phase_in(conn, session_id, task_id, kind, actual_duration_secs, interruptions)
        })
    }

    /// Transaction-scoped variant of [`complete_phase`], for callers that
    /// compose it with more work in the same transaction (the manager
    /// begins the next phase's record atomically with the confirm).
    ///
    /// [`complete_phase`]: Self::complete_phase
    pub fn complete_phase_in(
        &self,
        conn: &Connection,
        session_id: i64,
        task_id: i64,
        kind: PhaseKind,
        actual_duration_secs: u64,
        interruptions: u32,
    ) -> Result<RewardApplicationResult> {
        session_db::finalize_session(conn, session_id, actual_duration_secs, interruptions)?;
        let record = session_db::get_session(conn, session_id)?
            .ok_or(SessionError::NotFound { session_id })?;

        let now = self.clock.now();
        let actual = actual_duration_secs as i64;
        let significant = kind.is_focus() && actual >= self.rewards.significant_focus_seconds;

        stats_db::ensure_task_stats(conn, task_id)?;
        if kind.is_focus() {
            stats_db::add_time_spent(conn, task_id, actual)?;
            stats_db::add_focus_time(conn, task_id, actual)?;
            if significant {
                stats_db::increment_focus_sessions(conn, task_id)?;
            }
        }
        stats_db::add_interruptions(conn, task_id, i64::from(interruptions))?;

        let mut deltas = RewardApplicationResult::zero();
        if significant {
            let profile = gamification_db::get_profile_by_user(conn, record.user_id)?
                .ok_or(GamificationError::ProfileNotFound {
                    user_id: record.user_id,
                })?;
            let pipeline = RewardPipeline::new(conn);

            deltas += RewardApplicationResult {
                delta_xp: evaluate_value(&self.rewards.focus_xp, profile.level)?,
                delta_coins: evaluate_value(&self.rewards.focus_coins, profile.level)?,
            };
            deltas += pipeline.apply_event(
                profile.id,
                profile.level,
                &GamificationEvent::PomodoroCompleted {
                    session_id,
                    duration_secs: actual_duration_secs,
                    task_id,
                },
                now,
            )?;
            self.water_selected_plant(conn, &pipeline);

            let experience = (profile.experience + deltas.delta_xp).max(0);
            let coins = (profile.coins + deltas.delta_coins).max(0);
            gamification_db::update_profile_progress(conn, profile.id, experience, coins, now)?;
            if !deltas.is_zero() {
                // The profile update stands even if the ledger write fails;
                // the cascade accepts the provenance gap.
                if let Err(err) = gamification_db::append_history(
                    conn,
                    profile.id,
                    now,
                    deltas.delta_xp,
                    deltas.delta_coins,
                    HistoryReason::PomodoroCompleted,
                    Some(task_id),
                ) {
                    error!(task_id, error = %err, "history append failed after profile update");
                }
            }
            info!(
                session_id,
                task_id,
                actual_duration_secs,
                delta_xp = deltas.delta_xp,
                delta_coins = deltas.delta_coins,
                "focus session completed"
            );
        } else if kind.is_focus() {
            // Too short to count as a session; only the activity stamp.
            if let Some(profile) = gamification_db::get_profile_by_user(conn, record.user_id)? {
                gamification_db::update_profile_last_active(conn, profile.id, now)?;
            }
            debug!(session_id, actual_duration_secs, "focus phase below significance threshold");
        }

        if significant {
            stats_db::add_global_minutes(conn, actual / 60)?;
        }
        stats_db::update_global_last_active(conn, now)?;

        Ok(deltas)
    }

    /// Complete a task outside the normal timer flow.
    ///
    /// With a snapshot of an interrupted phase, that phase is finalized
    /// first with its wall-clock duration. The task must exist; it is
    /// marked DONE and the first completion (and only the first) pays
    /// base rewards, feeds the TaskCompleted event through the pipeline
    /// and counts toward global completed tasks.
    pub fn force_complete_task(
        &self,
        task_id: i64,
        snapshot: Option<InterruptedPhaseInfo>,
    ) -> Result<RewardApplicationResult> {
        self.db
            .with_transaction(|conn| self.force_complete_task_in(conn, task_id, snapshot))
    }

    /// Transaction-scoped variant of [`force_complete_task`].
    ///
    /// [`force_complete_task`]: Self::force_complete_task
    pub fn force_complete_task_in(
        &self,
        conn: &Connection,
        task_id: i64,
        snapshot: Option<InterruptedPhaseInfo>,
    ) -> Result<RewardApplicationResult> {
        let now = self.clock.now();
        let mut total = RewardApplicationResult::zero();

        if let Some(info) = snapshot {
            let actual = (now - info.start_time).num_seconds().max(0) as u64;
            total += self.complete_phase_in(
                conn,
                info.session_record_id,
                info.task_id,
                info.kind,
                actual,
                info.interruptions,
            )?;
        }

        let task = task_db::get_task(conn, task_id)?
            .ok_or(GamificationError::TaskNotFound { task_id })?;
        task_db::set_task_status(conn, task_id, TaskStatus::Done, now)?;
        stats_db::ensure_task_stats(conn, task_id)?;
        let stats = stats_db::get_task_stats(conn, task_id)?
            .ok_or_else(|| DatabaseError::QueryFailed("task statistics row missing".into()))?;
        let first_completion = !stats.was_completed_once;

        // Loaded after any snapshot reconciliation, so the phase's own
        // profile write is already reflected here.
        let profile = gamification_db::get_profile_by_user(conn, task.user_id)?;

        let mut task_deltas = RewardApplicationResult::zero();
        if first_completion {
            stats_db::increment_completed_tasks(conn)?;
            if let Some(profile) = &profile {
                let pipeline = RewardPipeline::new(conn);
                task_deltas += RewardApplicationResult {
                    delta_xp: evaluate_value(&self.rewards.focus_xp, profile.level)?,
                    delta_coins: evaluate_value(&self.rewards.focus_coins, profile.level)?,
                };
                task_deltas += pipeline.apply_event(
                    profile.id,
                    profile.level,
                    &GamificationEvent::TaskCompleted {
                        task_id,
                        tags: task.tags.clone(),
                    },
                    now,
                )?;
                self.water_selected_plant(conn, &pipeline);
            }
            stats_db::mark_completed_once(conn, task_id)?;
        }
        stats_db::mark_completion_time(conn, task_id, now)?;

        if let Some(profile) = &profile {
            let experience = (profile.experience + task_deltas.delta_xp).max(0);
            let coins = (profile.coins + task_deltas.delta_coins).max(0);
            gamification_db::update_profile_progress(conn, profile.id, experience, coins, now)?;
            if !task_deltas.is_zero() {
                if let Err(err) = gamification_db::append_history(
                    conn,
                    profile.id,
                    now,
                    task_deltas.delta_xp,
                    task_deltas.delta_coins,
                    HistoryReason::TaskCompleted,
                    Some(task_id),
                ) {
                    error!(task_id, error = %err, "history append failed after profile update");
                }
            }
        }
        stats_db::update_global_last_active(conn, now)?;

        info!(
            task_id,
            first_completion,
            delta_xp = task_deltas.delta_xp,
            delta_coins = task_deltas.delta_coins,
            "task completed"
        );
        total += task_deltas;
        Ok(total)
    }

    /// Growth points for the selected plant. Best-effort: every failure
    /// is logged and swallowed, the transaction continues.
    fn water_selected_plant(&self, conn: &Connection, pipeline: &RewardPipeline) {
        match gamification_db::selected_plant_id(conn) {
            Ok(Some(plant_id)) => {
                if let Err(err) =
                    pipeline.apply_growth_points(plant_id, self.rewards.growth_points_per_focus)
                {
                    error!(plant_id, error = %err, "growth points failed, continuing without growth");
                }
            }
            Ok(None) => {}
            Err(err) => error!(error = %err, "selected plant lookup failed, skipping growth"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::CoreError;
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
    }

    struct Fixture {
        db: Database,
        clock: FixedClock,
        task_id: i64,
        gamification_id: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::open_memory().unwrap();
        let start = now() - Duration::minutes(30);
        let task_id =
            task_db::insert_task(db.conn(), 1, "write report", &["deep".into()], start).unwrap();
        let gamification_id = gamification_db::ensure_profile(db.conn(), 1, start).unwrap();
        Fixture {
            db,
            clock: FixedClock::new(now()),
            task_id,
            gamification_id,
        }
    }

    fn begin(f: &Fixture, kind: PhaseKind, planned_secs: u64) -> i64 {
        session_db::begin_session(
            f.db.conn(),
            1,
            f.task_id,
            kind,
            planned_secs,
            now() - Duration::seconds(planned_secs as i64),
        )
        .unwrap()
    }

    fn orchestrator(f: &Fixture) -> CompletionOrchestrator<'_> {
        CompletionOrchestrator::new(&f.db, &f.clock, RewardsConfig::default())
    }

    #[test]
    fn significant_focus_pays_rewards_and_writes_history() {
        let f = fixture();
        let session = begin(&f, PhaseKind::Focus, 1500);

        let deltas = orchestrator(&f)
            .complete_phase(session, f.task_id, PhaseKind::Focus, 650, 1)
            .unwrap();
        assert_eq!(deltas.delta_xp, 10);
        assert_eq!(deltas.delta_coins, 2);

        let stats = stats_db::get_task_stats(f.db.conn(), f.task_id)
            .unwrap()
            .unwrap();
        assert_eq!(stats.completed_focus_sessions, 1);
        assert_eq!(stats.total_focus_seconds, 650);
        assert_eq!(stats.time_spent_seconds, 650);
        assert_eq!(stats.total_interruptions, 1);

        let profile = gamification_db::get_profile(f.db.conn(), f.gamification_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.experience, 10);
        assert_eq!(profile.coins, 2);

        let history = gamification_db::list_history(f.db.conn(), f.gamification_id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, HistoryReason::PomodoroCompleted);
        assert_eq!(history[0].related_entity_id, Some(f.task_id));

        let global = stats_db::get_global_stats(f.db.conn()).unwrap();
        assert_eq!(global.total_time_spent_minutes, 10);
    }

    #[test]
    fn short_focus_updates_time_but_earns_nothing() {
        let f = fixture();
        let session = begin(&f, PhaseKind::Focus, 1500);

        let deltas = orchestrator(&f)
            .complete_phase(session, f.task_id, PhaseKind::Focus, 120, 0)
            .unwrap();
        assert!(deltas.is_zero());

        let stats = stats_db::get_task_stats(f.db.conn(), f.task_id)
            .unwrap()
            .unwrap();
        assert_eq!(stats.completed_focus_sessions, 0);
        assert_eq!(stats.time_spent_seconds, 120);

        let history = gamification_db::list_history(f.db.conn(), f.gamification_id, 10).unwrap();
        assert!(history.is_empty());

        let global = stats_db::get_global_stats(f.db.conn()).unwrap();
        assert_eq!(global.total_time_spent_minutes, 0);
        assert!(global.last_active.is_some());
    }

    #[test]
    fn breaks_record_interruptions_but_no_focus_stats() {
        let f = fixture();
        let session = begin(&f, PhaseKind::ShortBreak, 300);

        let deltas = orchestrator(&f)
            .complete_phase(session, f.task_id, PhaseKind::ShortBreak, 300, 2)
            .unwrap();
        assert!(deltas.is_zero());

        let stats = stats_db::get_task_stats(f.db.conn(), f.task_id)
            .unwrap()
            .unwrap();
        assert_eq!(stats.time_spent_seconds, 0);
        assert_eq!(stats.total_focus_seconds, 0);
        assert_eq!(stats.total_interruptions, 2);
    }

    #[test]
    fn confirming_the_same_session_twice_is_fatal() {
        let f = fixture();
        let session = begin(&f, PhaseKind::Focus, 1500);
        let orch = orchestrator(&f);

        orch.complete_phase(session, f.task_id, PhaseKind::Focus, 650, 0)
            .unwrap();
        let err = orch
            .complete_phase(session, f.task_id, PhaseKind::Focus, 650, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Session(SessionError::AlreadyFinalized { .. })
        ));

        // Nothing double-applied.
        let profile = gamification_db::get_profile(f.db.conn(), f.gamification_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.experience, 10);
        let stats = stats_db::get_task_stats(f.db.conn(), f.task_id)
            .unwrap()
            .unwrap();
        assert_eq!(stats.completed_focus_sessions, 1);
    }

    #[test]
    fn missing_profile_rolls_back_the_whole_completion() {
        let db = Database::open_memory().unwrap();
        let start = now() - Duration::minutes(30);
        // User 9 has a task but no profile.
        let task_id = task_db::insert_task(db.conn(), 9, "orphan", &[], start).unwrap();
        let session =
            session_db::begin_session(db.conn(), 9, task_id, PhaseKind::Focus, 1500, start)
                .unwrap();

        let clock = FixedClock::new(now());
        let orch = CompletionOrchestrator::new(&db, &clock, RewardsConfig::default());
        let err = orch
            .complete_phase(session, task_id, PhaseKind::Focus, 650, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Gamification(GamificationError::ProfileNotFound { user_id: 9 })
        ));

        // The rollback covers the finalize and the statistics.
        let record = session_db::get_session(db.conn(), session).unwrap().unwrap();
        assert!(!record.completed);
        let stats = stats_db::get_task_stats(db.conn(), task_id).unwrap();
        assert!(stats.is_none());
    }

    #[test]
    fn first_task_completion_pays_once() {
        let f = fixture();
        let orch = orchestrator(&f);

        let first = orch.force_complete_task(f.task_id, None).unwrap();
        assert_eq!(first.delta_xp, 10);
        assert_eq!(first.delta_coins, 2);

        let task = task_db::get_task(f.db.conn(), f.task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        let global = stats_db::get_global_stats(f.db.conn()).unwrap();
        assert_eq!(global.completed_tasks, 1);

        let repeat = orch.force_complete_task(f.task_id, None).unwrap();
        assert!(repeat.is_zero());
        let global = stats_db::get_global_stats(f.db.conn()).unwrap();
        assert_eq!(global.completed_tasks, 1);
        let history = gamification_db::list_history(f.db.conn(), f.gamification_id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, HistoryReason::TaskCompleted);
    }

    #[test]
    fn force_completing_a_missing_task_is_fatal() {
        let f = fixture();
        let err = orchestrator(&f).force_complete_task(999, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Gamification(GamificationError::TaskNotFound { task_id: 999 })
        ));
    }

    #[test]
    fn force_complete_reconciles_the_interrupted_phase_first() {
        let f = fixture();
        let started = now() - Duration::seconds(300);
        let session = session_db::begin_session(
            f.db.conn(),
            1,
            f.task_id,
            PhaseKind::Focus,
            1500,
            started,
        )
        .unwrap();
        let snapshot = InterruptedPhaseInfo {
            session_record_id: session,
            task_id: f.task_id,
            kind: PhaseKind::Focus,
            start_time: started,
            interruptions: 1,
        };

        orchestrator(&f)
            .force_complete_task(f.task_id, Some(snapshot))
            .unwrap();

        let record = session_db::get_session(f.db.conn(), session).unwrap().unwrap();
        assert!(record.completed);
        assert_eq!(record.actual_duration_secs, 300);

        // 300s is below the significance threshold: only the task
        // cascade pays.
        let profile = gamification_db::get_profile(f.db.conn(), f.gamification_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.experience, 10);
        assert_eq!(profile.coins, 2);
        let stats = stats_db::get_task_stats(f.db.conn(), f.task_id)
            .unwrap()
            .unwrap();
        assert_eq!(stats.completed_focus_sessions, 0);
        assert_eq!(stats.time_spent_seconds, 300);
        assert!(stats.was_completed_once);
    }

    #[test]
    fn growth_failures_never_abort_the_completion() {
        let f = fixture();
        // Point the garden at a plant that doesn't exist.
        gamification_db::set_selected_plant(f.db.conn(), 424242).unwrap();
        let session = begin(&f, PhaseKind::Focus, 1500);

        let deltas = orchestrator(&f)
            .complete_phase(session, f.task_id, PhaseKind::Focus, 650, 0)
            .unwrap();
        assert_eq!(deltas.delta_xp, 10);

        let profile = gamification_db::get_profile(f.db.conn(), f.gamification_id)
            .unwrap()
            .unwrap();
        assert_eq!(profile.experience, 10);
    }

    #[test]
    fn growth_points_reach_the_selected_plant() {
        let f = fixture();
        let plant_id =
            gamification_db::insert_plant(f.db.conn(), f.gamification_id, "oak", now()).unwrap();
        gamification_db::set_selected_plant(f.db.conn(), plant_id).unwrap();
        let session = begin(&f, PhaseKind::Focus, 1500);

        orchestrator(&f)
            .complete_phase(session, f.task_id, PhaseKind::Focus, 650, 0)
            .unwrap();

        let plant = gamification_db::get_plant(f.db.conn(), plant_id).unwrap().unwrap();
        assert_eq!(plant.growth_points, 2);
    }
}
