//! Simulation options.
//!
//! `SimConfig` lives in the world as a resource and round-trips through JSON
//! so hosts can persist user options next to their own settings.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::Tags;
use crate::error::SimError;

/// Largest grid the simulation will allocate, in cells.
pub const MAX_GRID_CELLS: usize = 1 << 26;

/// Cell count of a `width` x `height` grid, `None` when negative or too big.
pub fn grid_len(width: i32, height: i32) -> Option<usize> {
    let len = usize::try_from(width.checked_mul(height)?).ok()?;
    (len <= MAX_GRID_CELLS).then_some(len)
}

/// Tunables for the simulation. Unknown JSON fields are ignored and missing
/// fields take their defaults.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Grid width in cells.
    pub grid_width: i32,
    /// Grid height in cells.
    pub grid_height: i32,
    /// Cell size in world units.
    pub cell_size: f32,
    /// Region index bucket side length, in cells.
    pub bucket_size: i32,
    /// Maximum reachability recomputations per tick. Extra work stays queued.
    pub reachability_budget: usize,
    /// Squared world distance under which two radbolts merge.
    pub merge_distance_sq: f32,
    /// Payload lost per cell travelled by newly spawned radbolts.
    pub payload_falloff: f32,
    /// Damage dealt to a living target on hit.
    pub living_hit_damage: f32,
    /// Whether a living hit also adds the payload to the target's exposure.
    pub apply_exposure: bool,
    /// Targets must carry at least one of these tags.
    pub eligible_tags: Tags,
    /// Targets carrying any of these tags are ignored.
    pub excluded_tags: Tags,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            grid_width: 64,
            grid_height: 64,
            cell_size: 1.0,
            bucket_size: 16,
            reachability_budget: 256,
            merge_distance_sq: 0.25,
            payload_falloff: 0.1,
            living_hit_damage: 10.0,
            apply_exposure: true,
            eligible_tags: Tags::CREATURE | Tags::COLONIST,
            excluded_tags: Tags::DEAD | Tags::SHIELDED,
        }
    }
}

impl SimConfig {
    /// Parse and validate options from JSON.
    pub fn from_json(data: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |field, reason| Err(SimError::InvalidConfig { field, reason });

        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return invalid("fixed_timestep", "must be a positive number of seconds");
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return invalid("cell_size", "must be positive");
        }
        if self.grid_width <= 0 || self.grid_height <= 0 {
            return invalid("grid_width/grid_height", "must be positive");
        }
        if grid_len(self.grid_width, self.grid_height).is_none() {
            return invalid("grid_width/grid_height", "grid has too many cells");
        }
        if self.bucket_size <= 0 {
            return invalid("bucket_size", "must be positive");
        }
        if self.reachability_budget == 0 {
            return invalid("reachability_budget", "must allow at least one recompute per tick");
        }
        if !(self.merge_distance_sq.is_finite() && self.merge_distance_sq >= 0.0) {
            return invalid("merge_distance_sq", "must be zero or positive");
        }
        if !(self.payload_falloff.is_finite() && self.payload_falloff >= 0.0) {
            return invalid("payload_falloff", "must be zero or positive");
        }
        if !self.living_hit_damage.is_finite() {
            return invalid("living_hit_damage", "must be finite");
        }
        Ok(())
    }

    /// Serialize options to pretty JSON.
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = SimConfig {
            reachability_budget: 8,
            apply_exposure: false,
            eligible_tags: Tags::CREATURE,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let restored = SimConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = SimConfig::from_json(r#"{ "grid_width": 12 }"#).unwrap();
        assert_eq!(config.grid_width, 12);
        assert_eq!(config.bucket_size, SimConfig::default().bucket_size);
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(SimConfig::from_json("{ not json").is_err());
    }

    fn rejected_field(json: &str) -> &'static str {
        match SimConfig::from_json(json) {
            Err(SimError::InvalidConfig { field, .. }) => field,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_bucket_size_rejected() {
        assert_eq!(rejected_field(r#"{ "bucket_size": 0 }"#), "bucket_size");
    }

    #[test]
    fn test_oversized_grid_rejected() {
        assert_eq!(
            rejected_field(r#"{ "grid_width": 70000, "grid_height": 70000 }"#),
            "grid_width/grid_height"
        );
        assert_eq!(rejected_field(r#"{ "grid_width": -3 }"#), "grid_width/grid_height");
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert_eq!(rejected_field(r#"{ "reachability_budget": 0 }"#), "reachability_budget");
    }

    #[test]
    fn test_non_positive_timestep_rejected() {
        assert_eq!(rejected_field(r#"{ "fixed_timestep": 0.0 }"#), "fixed_timestep");
        assert_eq!(rejected_field(r#"{ "cell_size": -1.0 }"#), "cell_size");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
        assert_eq!(grid_len(70_000, 70_000), None);
        assert_eq!(grid_len(64, 64), Some(4096));
    }
}
