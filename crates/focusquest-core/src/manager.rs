//! Command surface tying the timer engine, the session scope and the
//! completion orchestrator together.
//!
//! The manager owns one cycle: one engine over one generated schedule,
//! at most one open session record at a time. Durable effects always
//! commit before the in-memory state machine moves (confirm writes the
//! completion and the next phase's record in one transaction, then
//! advances the engine), so a storage failure leaves the engine parked
//! in `WaitingForConfirmation` and the command can simply be retried.
//!
//! The whole manager serializes through [`ManagerState`], which is how
//! the CLI keeps a cycle alive across invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::completion::CompletionOrchestrator;
use crate::error::{Result, SessionError, ValidationError};
use crate::events::Event;
use crate::gamification::reward::RewardApplicationResult;
use crate::session::{OpenSession, SessionScope};
use crate::storage::{session_db, Database, RewardsConfig};
use crate::timer::{PhaseSchedule, TimerEngine, TimerState};

/// Serializable snapshot of a manager between commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerState {
    pub engine: TimerEngine,
    pub open_session: Option<OpenSession>,
    pub user_id: i64,
    pub task_id: i64,
}

pub struct PomodoroManager {
    engine: TimerEngine,
    scope: SessionScope,
    user_id: i64,
    task_id: i64,
}

impl PomodoroManager {
    /// Begin a cycle: persist the first phase's session record, then
    /// start the engine.
    pub fn start(
        db: &Database,
        clock: &dyn Clock,
        user_id: i64,
        task_id: i64,
        schedule: PhaseSchedule,
    ) -> Result<(Self, Vec<Event>)> {
        let first = match schedule.get(0).copied() {
            Some(phase) => phase,
            None => {
                return Err(ValidationError::InvalidValue {
                    field: "schedule".to_string(),
                    message: "generated schedule is empty".to_string(),
                }
                .into())
            }
        };
        let now = clock.now();
        let record_id = db.with_transaction(|conn| {
            session_db::begin_session(conn, user_id, task_id, first.kind, first.duration_secs(), now)
        })?;

        let scope = SessionScope::new();
        scope.register(OpenSession {
            record_id,
            task_id,
            user_id,
            kind: first.kind,
            started_at: now,
        })?;

        let mut engine = TimerEngine::new(schedule);
        let mut events = Vec::new();
        if let Some(event) = engine.start_at(epoch_ms(now)) {
            events.push(event);
        }
        info!(task_id, record_id, kind = first.kind.as_str(), "cycle started");
        Ok((
            Self {
                engine,
                scope,
                user_id,
                task_id,
            },
            events,
        ))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.engine.state()
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn open_session(&self) -> Option<OpenSession> {
        self.scope.current()
    }

    pub fn snapshot(&self) -> Event {
        self.engine.snapshot()
    }

    // ── Engine-only commands ─────────────────────────────────────────

    pub fn pause(&mut self, clock: &dyn Clock) -> Option<Event> {
        self.engine.pause_at(epoch_ms(clock.now()))
    }

    pub fn resume(&mut self, clock: &dyn Clock) -> Option<Event> {
        self.engine.resume_at(epoch_ms(clock.now()))
    }

    /// Flush wall-clock time into the countdown; yields `PhaseExpired`
    /// once when the running phase reaches zero.
    pub fn tick(&mut self, clock: &dyn Clock) -> Option<Event> {
        self.engine.tick_at(epoch_ms(clock.now()))
    }

    // ── Committing commands ──────────────────────────────────────────

    /// Confirm an expired phase: finalize its record with the full
    /// planned duration, open the next phase's record in the same
    /// transaction, then advance the engine.
    ///
    /// A no-op unless the engine is in `WaitingForConfirmation`.
    pub fn confirm(
        &mut self,
        db: &Database,
        clock: &dyn Clock,
        rewards: &RewardsConfig,
    ) -> Result<Vec<Event>> {
        match self.engine.waiting_kind() {
            Some(_) => self.commit_waiting_phase(db, clock, rewards, false),
            None => Ok(Vec::new()),
        }
    }

    /// Skip a break that just expired instead of confirming it. Valid
    /// only while a break phase is awaiting confirmation; never counts
    /// an interruption.
    pub fn skip_break(
        &mut self,
        db: &Database,
        clock: &dyn Clock,
        rewards: &RewardsConfig,
    ) -> Result<Vec<Event>> {
        match self.engine.waiting_kind() {
            Some(kind) if kind.is_break() => self.commit_waiting_phase(db, clock, rewards, true),
            _ => Ok(Vec::new()),
        }
    }

    /// Abandon the cycle. The open record is finalized with its
    /// wall-clock duration before the engine stops; a storage failure
    /// leaves both the record and the engine untouched.
    pub fn stop(
        &mut self,
        db: &Database,
        clock: &dyn Clock,
        rewards: &RewardsConfig,
    ) -> Result<Vec<Event>> {
        if self.engine.state().is_idle() {
            return Ok(Vec::new());
        }
        let now = clock.now();
        let mut events = Vec::new();
        if let Some(open) = self.scope.current() {
            let info = open.interrupted(self.engine.interruptions());
            let actual = (now - info.start_time).num_seconds().max(0) as u64;
            let orchestrator = CompletionOrchestrator::new(db, clock, rewards.clone());
            let deltas = orchestrator.complete_phase(
                info.session_record_id,
                info.task_id,
                info.kind,
                actual,
                info.interruptions,
            )?;
            events.push(Event::PhaseCompleted {
                session_id: info.session_record_id,
                kind: info.kind,
                actual_duration_secs: actual,
                xp_delta: deltas.delta_xp,
                coins_delta: deltas.delta_coins,
                at: now,
            });
            self.scope.clear();
            info!(
                session_id = info.session_record_id,
                actual_duration_secs = actual,
                "cycle stopped, open phase reconciled"
            );
        }
        if let Some(event) = self.engine.stop_at(epoch_ms(now)) {
            events.push(event);
        }
        Ok(events)
    }

    /// Complete a task outright. When the running cycle belongs to that
    /// task, its open phase is reconciled in the same transaction and
    /// the engine stops.
    pub fn force_complete_task(
        &mut self,
        db: &Database,
        clock: &dyn Clock,
        rewards: &RewardsConfig,
        task_id: i64,
    ) -> Result<(RewardApplicationResult, Vec<Event>)> {
        let now = clock.now();
        let snapshot = self
            .scope
            .current()
            .filter(|open| open.task_id == task_id && !self.engine.state().is_idle())
            .map(|open| open.interrupted(self.engine.interruptions()));

        let orchestrator = CompletionOrchestrator::new(db, clock, rewards.clone());
        let deltas = orchestrator.force_complete_task(task_id, snapshot)?;

        let mut events = Vec::new();
        if snapshot.is_some() {
            self.scope.clear();
            if let Some(event) = self.engine.stop_at(epoch_ms(now)) {
                events.push(event);
            }
        }
        Ok((deltas, events))
    }

    // ── Persistence ──────────────────────────────────────────────────

    pub fn to_state(&self) -> ManagerState {
        ManagerState {
            engine: self.engine.clone(),
            open_session: self.scope.current(),
            user_id: self.user_id,
            task_id: self.task_id,
        }
    }

    pub fn from_state(state: ManagerState) -> Self {
        Self {
            engine: state.engine,
            scope: SessionScope::restore(state.open_session),
            user_id: state.user_id,
            task_id: state.task_id,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Shared commit path for Confirm and SkipBreak. The completion and
    /// the next phase's record land in one transaction; only then does
    /// the engine advance.
    fn commit_waiting_phase(
        &mut self,
        db: &Database,
        clock: &dyn Clock,
        rewards: &RewardsConfig,
        skipped: bool,
    ) -> Result<Vec<Event>> {
        let kind = match self.engine.waiting_kind() {
            Some(kind) => kind,
            None => return Ok(Vec::new()),
        };
        let open = self.scope.current().ok_or(SessionError::NoOpenSession)?;
        let now = clock.now();
        let interruptions = self.engine.interruptions();
        let actual = self.engine.total_ms() / 1000;
        let next = self
            .engine
            .schedule()
            .get(self.engine.phase_index() + 1)
            .copied();

        let orchestrator = CompletionOrchestrator::new(db, clock, rewards.clone());
        let (deltas, next_record) = db.with_transaction(|conn| {
            let deltas = orchestrator.complete_phase_in(
                conn,
                open.record_id,
                open.task_id,
                kind,
                actual,
                interruptions,
            )?;
            let next_record = match next {
                Some(phase) => Some(session_db::begin_session(
                    conn,
                    self.user_id,
                    self.task_id,
                    phase.kind,
                    phase.duration_secs(),
                    now,
                )?),
                None => None,
            };
            Ok((deltas, next_record))
        })?;

        // Committed; from here every mutation is in-memory.
        self.scope.clear();
        let mut events = Vec::new();
        if skipped {
            events.push(Event::BreakSkipped {
                phase_index: self.engine.phase_index(),
                kind,
                at: now,
            });
        } else {
            events.push(Event::PhaseCompleted {
                session_id: open.record_id,
                kind,
                actual_duration_secs: actual,
                xp_delta: deltas.delta_xp,
                coins_delta: deltas.delta_coins,
                at: now,
            });
        }
        if let (Some(phase), Some(record_id)) = (next, next_record) {
            self.scope.register(OpenSession {
                record_id,
                task_id: self.task_id,
                user_id: self.user_id,
                kind: phase.kind,
                started_at: now,
            })?;
        }
        if let Some(event) = self.engine.advance_at(epoch_ms(now)) {
            events.push(event);
        }
        Ok(events)
    }
}

fn epoch_ms(t: DateTime<Utc>) -> u64 {
    t.timestamp_millis().max(0) as u64
}
