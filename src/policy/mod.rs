use crate::world::Floor;
use thiserror::Error;

pub mod capacity_aware;
pub mod greedy_nearest;
pub mod model;

use capacity_aware::CapacityAware;
use greedy_nearest::GreedyNearest;
use model::AssignmentPolicy;

pub const DEFAULT_POLICY: &str = "greedy_nearest";

/// Policy selection as read from `[dispatch]`.
#[derive(Debug, Clone, Default)]
pub struct PolicySettings {
    pub name: Option<String>,
    pub idle_home_floor: Option<Floor>,
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown policy: {0}")]
    Unknown(String),
    #[error("invalid policy settings: {0}")]
    Invalid(String),
}

// Policy Factory
pub fn create_policy(
    settings: &PolicySettings,
) -> Result<Box<dyn AssignmentPolicy>, PolicyError> {
    match settings.name.as_deref().unwrap_or(DEFAULT_POLICY) {
        "greedy_nearest" => Ok(Box::new(GreedyNearest::new(settings.idle_home_floor))),
        "capacity_aware" => {
            if settings.max_capacity == Some(0) {
                return Err(PolicyError::Invalid(
                    "max_capacity must be greater than zero".to_string(),
                ));
            }
            Ok(Box::new(CapacityAware::new(
                settings.idle_home_floor,
                settings.max_capacity,
            )))
        }
        other => Err(PolicyError::Unknown(other.to_string())),
    }
}
