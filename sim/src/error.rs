//! Error types for the simulation core.
//!
//! Everything here is recoverable: the affected entity is skipped for the
//! tick or scheduled for removal. Stale region tokens are not represented;
//! they are programming errors and trip a debug assertion instead.

use bevy_ecs::entity::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Coordinates outside the grid.
    #[error("cell ({x}, {y}) is outside the grid")]
    InvalidCell { x: i32, y: i32 },

    /// A required companion component is absent.
    #[error("entity {entity} is missing required component {component}")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    /// The entity does not exist (already despawned).
    #[error("entity {0} does not exist")]
    UnknownEntity(Entity),

    /// An option is out of range.
    #[error("invalid option `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// Config or save data failed to (de)serialize.
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
