//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller is responsible for calling `tick()`
//! periodically and for serializing commands.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!         Running -> WaitingForConfirmation -> Running (next phase) | Idle
//! ```
//!
//! Expiry is not a completion: the engine parks in
//! `WaitingForConfirmation` until the owner has committed the phase
//! outcome and calls [`TimerEngine::advance_at`]. Every command has an
//! explicit-timestamp variant so duration math stays deterministic under
//! test; the plain variants use the system clock.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::cycle::{Phase, PhaseKind, PhaseSchedule};
use crate::events::Event;

/// Timer state with per-variant payload. Replaced wholesale on every
/// transition; there is no partially-valid field bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running {
        remaining_ms: u64,
        total_ms: u64,
        kind: PhaseKind,
        interruptions: u32,
    },
    Paused {
        remaining_ms: u64,
        total_ms: u64,
        kind: PhaseKind,
        interruptions: u32,
    },
    /// Countdown hit zero but the outcome is not yet committed.
    WaitingForConfirmation {
        kind: PhaseKind,
        total_ms: u64,
        interruptions: u32,
    },
}

impl TimerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TimerState::Idle)
    }
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread. Invalid
/// (state, command) pairs return `None` and mutate nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    schedule: PhaseSchedule,
    state: TimerState,
    phase_index: usize,
    /// Timestamp (ms since epoch) of the last flush while running.
    /// Used to compute elapsed time between ticks.
    #[serde(default)]
    last_tick_epoch_ms: Option<u64>,
}

impl TimerEngine {
    /// Create a new engine over a freshly generated schedule, in `Idle`
    /// with the first phase ready. Schedules are not restartable; a new
    /// cycle gets a new engine.
    pub fn new(schedule: PhaseSchedule) -> Self {
        Self {
            schedule,
            state: TimerState::Idle,
            phase_index: 0,
            last_tick_epoch_ms: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.schedule.get(self.phase_index)
    }

    pub fn remaining_ms(&self) -> u64 {
        match self.state {
            TimerState::Running { remaining_ms, .. }
            | TimerState::Paused { remaining_ms, .. } => remaining_ms,
            TimerState::WaitingForConfirmation { .. } => 0,
            TimerState::Idle => self.current_phase().map(|p| p.duration_ms()).unwrap_or(0),
        }
    }

    pub fn total_ms(&self) -> u64 {
        match self.state {
            TimerState::Running { total_ms, .. }
            | TimerState::Paused { total_ms, .. }
            | TimerState::WaitingForConfirmation { total_ms, .. } => total_ms,
            TimerState::Idle => self.current_phase().map(|p| p.duration_ms()).unwrap_or(0),
        }
    }

    pub fn interruptions(&self) -> u32 {
        match self.state {
            TimerState::Running { interruptions, .. }
            | TimerState::Paused { interruptions, .. }
            | TimerState::WaitingForConfirmation { interruptions, .. } => interruptions,
            TimerState::Idle => 0,
        }
    }

    /// Kind of the phase awaiting confirmation, if any.
    pub fn waiting_kind(&self) -> Option<PhaseKind> {
        match self.state {
            TimerState::WaitingForConfirmation { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn phase_progress(&self) -> f64 {
        let total = self.total_ms();
        if total == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_ms() as f64 / total as f64)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.state,
            phase_index: self.phase_index,
            kind: self.current_phase().map(|p| p.kind),
            remaining_ms: self.remaining_ms(),
            total_ms: self.total_ms(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        self.start_at(now_ms())
    }

    /// Start the first phase. Valid only from `Idle` with a non-empty
    /// schedule remaining.
    pub fn start_at(&mut self, now_epoch_ms: u64) -> Option<Event> {
        if !self.state.is_idle() {
            return None;
        }
        let phase = *self.current_phase()?;
        let total = phase.duration_ms();
        self.state = TimerState::Running {
            remaining_ms: total,
            total_ms: total,
            kind: phase.kind,
            interruptions: 0,
        };
        self.last_tick_epoch_ms = Some(now_epoch_ms);
        Some(Event::TimerStarted {
            phase_index: self.phase_index,
            kind: phase.kind,
            duration_secs: phase.duration_secs(),
            at: Utc::now(),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        self.pause_at(now_ms())
    }

    /// Pause a running phase, counting one interruption. Pausing while
    /// already paused is a no-op, so interruptions grow at most once per
    /// Running -> Paused transition.
    pub fn pause_at(&mut self, now_epoch_ms: u64) -> Option<Event> {
        match self.state {
            TimerState::Running {
                remaining_ms,
                total_ms,
                kind,
                interruptions,
            } => {
                let remaining = self.flush_elapsed(remaining_ms, now_epoch_ms);
                let interruptions = interruptions + 1;
                self.state = TimerState::Paused {
                    remaining_ms: remaining,
                    total_ms,
                    kind,
                    interruptions,
                };
                self.last_tick_epoch_ms = None;
                Some(Event::TimerPaused {
                    remaining_ms: remaining,
                    interruptions,
                    at: Utc::now(),
                })
            }
            _ => None,
        }
    }

    pub fn resume(&mut self) -> Option<Event> {
        self.resume_at(now_ms())
    }

    /// Resume a paused phase with its remaining time intact.
    pub fn resume_at(&mut self, now_epoch_ms: u64) -> Option<Event> {
        match self.state {
            TimerState::Paused {
                remaining_ms,
                total_ms,
                kind,
                interruptions,
            } => {
                self.state = TimerState::Running {
                    remaining_ms,
                    total_ms,
                    kind,
                    interruptions,
                };
                self.last_tick_epoch_ms = Some(now_epoch_ms);
                Some(Event::TimerResumed {
                    remaining_ms,
                    at: Utc::now(),
                })
            }
            _ => None,
        }
    }

    pub fn tick(&mut self) -> Option<Event> {
        self.tick_at(now_ms())
    }

    /// Flush wall-clock time into the countdown. Returns
    /// `Some(Event::PhaseExpired)` once when the phase reaches zero; the
    /// engine then parks in `WaitingForConfirmation`.
    pub fn tick_at(&mut self, now_epoch_ms: u64) -> Option<Event> {
        match self.state {
            TimerState::Running {
                remaining_ms,
                total_ms,
                kind,
                interruptions,
            } => {
                let remaining = self.flush_elapsed(remaining_ms, now_epoch_ms);
                if remaining == 0 {
                    self.state = TimerState::WaitingForConfirmation {
                        kind,
                        total_ms,
                        interruptions,
                    };
                    self.last_tick_epoch_ms = None;
                    return Some(Event::PhaseExpired {
                        phase_index: self.phase_index,
                        kind,
                        at: Utc::now(),
                    });
                }
                self.state = TimerState::Running {
                    remaining_ms: remaining,
                    total_ms,
                    kind,
                    interruptions,
                };
                None
            }
            _ => None,
        }
    }

    pub fn advance(&mut self) -> Option<Event> {
        self.advance_at(now_ms())
    }

    /// Advance past a confirmed phase: next phase starts as `Running`, or
    /// the engine goes `Idle` when the schedule is exhausted. Valid only
    /// from `WaitingForConfirmation`, and only once the owner has
    /// committed the phase outcome.
    pub fn advance_at(&mut self, now_epoch_ms: u64) -> Option<Event> {
        if !matches!(self.state, TimerState::WaitingForConfirmation { .. }) {
            return None;
        }
        self.phase_index += 1;
        match self.schedule.get(self.phase_index).copied() {
            Some(phase) => {
                let total = phase.duration_ms();
                self.state = TimerState::Running {
                    remaining_ms: total,
                    total_ms: total,
                    kind: phase.kind,
                    interruptions: 0,
                };
                self.last_tick_epoch_ms = Some(now_epoch_ms);
                Some(Event::TimerStarted {
                    phase_index: self.phase_index,
                    kind: phase.kind,
                    duration_secs: phase.duration_secs(),
                    at: Utc::now(),
                })
            }
            None => {
                self.state = TimerState::Idle;
                self.last_tick_epoch_ms = None;
                Some(Event::CycleCompleted {
                    focus_phases: self.schedule.focus_count(),
                    at: Utc::now(),
                })
            }
        }
    }

    pub fn stop(&mut self) -> Option<Event> {
        self.stop_at(now_ms())
    }

    /// Abandon the cycle from any non-idle state.
    pub fn stop_at(&mut self, _now_epoch_ms: u64) -> Option<Event> {
        if self.state.is_idle() {
            return None;
        }
        self.state = TimerState::Idle;
        self.last_tick_epoch_ms = None;
        Some(Event::TimerStopped { at: Utc::now() })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn flush_elapsed(&mut self, remaining_ms: u64, now_epoch_ms: u64) -> u64 {
        let remaining = match self.last_tick_epoch_ms {
            Some(last) => remaining_ms.saturating_sub(now_epoch_ms.saturating_sub(last)),
            None => remaining_ms,
        };
        self.last_tick_epoch_ms = Some(now_epoch_ms);
        remaining
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::cycle::{generate, ScheduleParams};

    const T0: u64 = 1_700_000_000_000;

    fn engine_for(minutes: i64) -> TimerEngine {
        TimerEngine::new(generate(minutes, &ScheduleParams::default()))
    }

    #[test]
    fn start_pause_resume_preserves_remaining_exactly() {
        let mut engine = engine_for(50);
        assert!(engine.start_at(T0).is_some());
        engine.tick_at(T0 + 10_000);
        assert_eq!(engine.remaining_ms(), 25 * 60_000 - 10_000);

        assert!(engine.pause_at(T0 + 20_000).is_some());
        let at_pause = engine.remaining_ms();
        assert_eq!(at_pause, 25 * 60_000 - 20_000);
        assert_eq!(engine.interruptions(), 1);

        // Pausing twice counts one interruption.
        assert!(engine.pause_at(T0 + 30_000).is_none());
        assert_eq!(engine.interruptions(), 1);

        // The paused gap does not consume countdown time.
        assert!(engine.resume_at(T0 + 300_000).is_some());
        assert_eq!(engine.remaining_ms(), at_pause);
    }

    #[test]
    fn tick_to_zero_parks_in_waiting() {
        let mut engine = engine_for(50);
        engine.start_at(T0);
        let expired = engine.tick_at(T0 + 25 * 60_000);
        assert!(matches!(
            expired,
            Some(Event::PhaseExpired {
                kind: PhaseKind::Focus,
                ..
            })
        ));
        assert_eq!(engine.waiting_kind(), Some(PhaseKind::Focus));
        assert_eq!(engine.remaining_ms(), 0);
        // Further ticks are no-ops; expiry fires once.
        assert!(engine.tick_at(T0 + 26 * 60_000).is_none());
    }

    #[test]
    fn advance_starts_next_phase_with_fresh_interruptions() {
        let mut engine = engine_for(50);
        engine.start_at(T0);
        engine.pause_at(T0 + 1_000);
        engine.resume_at(T0 + 2_000);
        engine.tick_at(T0 + 30 * 60_000);
        assert_eq!(engine.interruptions(), 1);

        let started = engine.advance_at(T0 + 30 * 60_000);
        assert!(matches!(
            started,
            Some(Event::TimerStarted {
                kind: PhaseKind::ShortBreak,
                ..
            })
        ));
        assert_eq!(engine.phase_index(), 1);
        assert_eq!(engine.interruptions(), 0);
    }

    #[test]
    fn advancing_past_the_last_phase_completes_the_cycle() {
        let mut engine = engine_for(25);
        engine.start_at(T0);
        engine.tick_at(T0 + 25 * 60_000);
        let done = engine.advance_at(T0 + 25 * 60_000);
        assert!(matches!(done, Some(Event::CycleCompleted { focus_phases: 1, .. })));
        assert!(engine.state().is_idle());
        // Exhausted engines do not restart.
        assert!(engine.start_at(T0 + 26 * 60_000).is_none());
    }

    #[test]
    fn commands_invalid_for_the_state_are_no_ops() {
        let mut engine = engine_for(50);
        let before = engine.state();
        assert!(engine.pause_at(T0).is_none());
        assert!(engine.resume_at(T0).is_none());
        assert!(engine.tick_at(T0).is_none());
        assert!(engine.advance_at(T0).is_none());
        assert!(engine.stop_at(T0).is_none());
        assert_eq!(engine.state(), before);

        engine.start_at(T0);
        assert!(engine.resume_at(T0 + 1).is_none());
        assert!(engine.advance_at(T0 + 1).is_none());
    }

    #[test]
    fn stop_abandons_from_any_active_state() {
        let mut engine = engine_for(50);
        engine.start_at(T0);
        assert!(engine.stop_at(T0 + 5_000).is_some());
        assert!(engine.state().is_idle());

        let mut engine = engine_for(50);
        engine.start_at(T0);
        engine.pause_at(T0 + 5_000);
        assert!(engine.stop_at(T0 + 6_000).is_some());
        assert!(engine.state().is_idle());
    }

    #[test]
    fn engine_state_survives_a_serde_round_trip() {
        let mut engine = engine_for(50);
        engine.start_at(T0);
        engine.pause_at(T0 + 12_345);

        let json = serde_json::to_string(&engine).unwrap();
        let restored: TimerEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state(), engine.state());
        assert_eq!(restored.phase_index(), engine.phase_index());
        assert_eq!(restored.remaining_ms(), 25 * 60_000 - 12_345);
    }
}
