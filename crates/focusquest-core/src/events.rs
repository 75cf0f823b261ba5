use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{PhaseKind, TimerState};

/// Every state change in the engine produces an Event.
/// Front ends poll for events; observers subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase_index: usize,
        kind: PhaseKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_ms: u64,
        interruptions: u32,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Countdown hit zero; the outcome is not committed until Confirm.
    PhaseExpired {
        phase_index: usize,
        kind: PhaseKind,
        at: DateTime<Utc>,
    },
    /// A phase outcome was committed (session finalized, cascade applied).
    PhaseCompleted {
        session_id: i64,
        kind: PhaseKind,
        actual_duration_secs: u64,
        xp_delta: i64,
        coins_delta: i64,
        at: DateTime<Utc>,
    },
    /// A waiting break was skipped; commits like Confirm, counts no
    /// interruption.
    BreakSkipped {
        phase_index: usize,
        kind: PhaseKind,
        at: DateTime<Utc>,
    },
    TimerStopped {
        at: DateTime<Utc>,
    },
    /// The schedule is exhausted and the last phase was confirmed.
    CycleCompleted {
        focus_phases: usize,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        phase_index: usize,
        kind: Option<PhaseKind>,
        remaining_ms: u64,
        total_ms: u64,
        at: DateTime<Utc>,
    },
}
