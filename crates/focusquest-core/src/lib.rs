//! # FocusQuest Core Library
//!
//! This library provides the core business logic for the FocusQuest pomodoro
//! timer and gamification engine. It implements a CLI-first philosophy where
//! all operations are available via a standalone CLI binary, with any GUI
//! being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine that requires the
//!   caller to periodically invoke `tick()` for progress updates. Expired
//!   phases park in `WaitingForConfirmation` until the user confirms them.
//! - **Storage**: SQLite-based session, task and gamification persistence
//!   plus TOML-based configuration
//! - **Completion Cascade**: Confirmed phases and completed tasks fan out
//!   into statistics, profile rewards, challenge progress and plant growth
//!   inside a single transaction
//! - **Manager**: Command surface binding one timer cycle to its session
//!   records, serializable across process restarts
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`PomodoroManager`]: Cycle lifecycle and commit-then-advance commands
//! - [`CompletionOrchestrator`]: The completion cascade
//! - [`Database`]: Session, task and gamification persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod completion;
pub mod error;
pub mod events;
pub mod gamification;
pub mod manager;
pub mod session;
pub mod storage;
pub mod task;
pub mod timer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use completion::CompletionOrchestrator;
pub use error::{
    ConfigError, CoreError, DatabaseError, GamificationError, Result, SessionError,
    ValidationError,
};
pub use events::Event;
pub use gamification::{
    Challenge, ChallengeProgress, ChallengeRule, ChallengeStatus, GamificationEvent,
    GamificationProfile, HistoryEntry, HistoryReason, Plant, Reward, RewardApplicationResult,
    RewardKind, RewardPipeline, RulePeriod, RuleType,
};
pub use manager::{ManagerState, PomodoroManager};
pub use session::{InterruptedPhaseInfo, OpenSession, SessionRecord, SessionScope};
pub use storage::{Config, Database, GlobalStatistics, RewardsConfig, ScheduleConfig, TaskStatistics};
pub use task::{Task, TaskStatus};
pub use timer::{generate, Phase, PhaseKind, PhaseSchedule, ScheduleParams, TimerEngine, TimerState};
