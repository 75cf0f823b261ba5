mod cycle;
mod engine;

pub use cycle::{generate, Phase, PhaseKind, PhaseSchedule, ScheduleParams};
pub use engine::{TimerEngine, TimerState};
