//! Gamification: profiles, rewards, challenges and garden growth.

pub mod challenge;
pub mod growth;
pub mod pipeline;
pub mod profile;
pub mod reward;

pub use challenge::{
    Challenge, ChallengeProgress, ChallengeRule, ChallengeStatus, GamificationEvent, RulePeriod,
    RuleType,
};
pub use growth::{Plant, MAX_GROWTH_STAGE};
pub use pipeline::RewardPipeline;
pub use profile::{GamificationProfile, HistoryEntry, HistoryReason};
pub use reward::{evaluate_value, Reward, RewardApplicationResult, RewardKind};
