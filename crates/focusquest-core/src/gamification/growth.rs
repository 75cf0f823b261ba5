//! Garden plants, the growth resource.
//!
//! Growth points accumulate on the selected plant; crossing the next
//! stage threshold advances the plant by at most one stage per
//! application, no matter how many points landed at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_GROWTH_STAGE: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub gamification_id: i64,
    pub plant_type: String,
    pub growth_stage: u32,
    pub growth_points: i64,
    pub last_watered: DateTime<Utc>,
}

/// Cumulative points required to reach a stage. None past the last stage.
pub fn stage_threshold(stage: u32) -> Option<i64> {
    match stage {
        1 => Some(50),
        2 => Some(120),
        3 => Some(250),
        4 => Some(450),
        5 => Some(700),
        6 => Some(1000),
        7 => Some(1400),
        8 => Some(1900),
        9 => Some(2500),
        _ => None,
    }
}

/// Apply growth points to a plant in memory. Returns true when the row
/// changed and needs persisting; non-positive points and max-stage plants
/// are skipped.
pub fn apply_points(plant: &mut Plant, points: i64) -> bool {
    if points <= 0 || plant.growth_stage >= MAX_GROWTH_STAGE {
        return false;
    }
    plant.growth_points += points;
    if let Some(threshold) = stage_threshold(plant.growth_stage + 1) {
        if plant.growth_points >= threshold {
            plant.growth_stage += 1;
        }
    }
    true
}
