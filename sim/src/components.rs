//! ECS Components for the Gridwatch simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::Cell;
use crate::spatial::RegionToken;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// Continuous world position.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// 2D velocity vector, used by walking entities.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    pub fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }
}

/// Cell an entity was in when it was last checked.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCell(pub Cell);

/// The entity's occupant entry in the region index.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupantToken(pub RegionToken);

// ============================================================================
// TAGS
// ============================================================================

bitflags::bitflags! {
    /// Capability tags used to filter collision targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Tags: u32 {
        const CREATURE  = 1 << 0;
        const COLONIST  = 1 << 1;
        const ROBOT     = 1 << 2;
        const DEAD      = 1 << 3;
        const SHIELDED  = 1 << 4;
        const FLYING    = 1 << 5;
    }
}

/// Tag set carried by an entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagSet(pub Tags);

impl TagSet {
    /// Has any of `eligible` and none of `excluded`.
    pub fn qualifies(&self, eligible: Tags, excluded: Tags) -> bool {
        self.0.intersects(eligible) && !self.0.intersects(excluded)
    }
}

// ============================================================================
// LIVING COMPONENTS
// ============================================================================

/// Health of a living entity.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Accumulated radiation dose. Optional; hits only raise it when present.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Exposure {
    pub dose: f32,
}

/// Marker for entities whose cell seeds the navigation flood fill.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Navigator;

// ============================================================================
// RADBOLT COMPONENTS
// ============================================================================

/// One of eight travel directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Heading {
    #[default]
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl Heading {
    /// Unit vector for this heading.
    pub fn vector(self) -> (f32, f32) {
        use std::f32::consts::FRAC_1_SQRT_2 as D;
        match self {
            Heading::Up => (0.0, 1.0),
            Heading::UpRight => (D, D),
            Heading::Right => (1.0, 0.0),
            Heading::DownRight => (D, -D),
            Heading::Down => (0.0, -1.0),
            Heading::DownLeft => (-D, -D),
            Heading::Left => (-1.0, 0.0),
            Heading::UpLeft => (-D, D),
        }
    }
}

/// A moving bolt of energy.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Radbolt {
    /// Remaining energy.
    pub payload: f32,
    /// Payload lost per cell boundary crossed.
    pub falloff: f32,
    /// World units per second.
    pub speed: f32,
    pub heading: Heading,
}

impl Radbolt {
    pub fn new(payload: f32, speed: f32, heading: Heading, falloff: f32) -> Self {
        Self { payload, falloff, speed, heading }
    }
}

/// Structure that can absorb radbolts.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureStructure {
    /// Input port enabled. When disabled, bolts pass straight through.
    pub accepts_input: bool,
    pub stored: f32,
    pub capacity: f32,
}

impl CaptureStructure {
    pub fn new(capacity: f32) -> Self {
        Self {
            accepts_input: true,
            stored: 0.0,
            capacity,
        }
    }

    pub fn can_capture(&self) -> bool {
        self.accepts_input && self.stored < self.capacity
    }

    pub fn store(&mut self, payload: f32) {
        self.stored = (self.stored + payload).min(self.capacity);
    }
}

// ============================================================================
// LIFECYCLE COMPONENTS
// ============================================================================

/// Why an entity is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    OutOfBounds,
    Depleted,
    Captured,
    Solid,
    Merged,
    HitLiving,
    Despawned,
}

/// Scheduled for removal at the end of the tick. Never destroyed mid-update.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRemoval(pub RemovalReason);

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for spawning a radbolt.
#[derive(Bundle)]
pub struct RadboltBundle {
    pub radbolt: Radbolt,
    pub position: Position,
}

impl RadboltBundle {
    pub fn new(x: f32, y: f32, radbolt: Radbolt) -> Self {
        Self {
            radbolt,
            position: Position::new(x, y),
        }
    }
}

/// Bundle for spawning a creature or colonist.
#[derive(Bundle, Default)]
pub struct LivingBundle {
    pub position: Position,
    pub velocity: Velocity,
    pub health: Health,
    pub tags: TagSet,
    pub exposure: Exposure,
}

impl LivingBundle {
    pub fn new(x: f32, y: f32, tags: Tags) -> Self {
        Self {
            position: Position::new(x, y),
            tags: TagSet(tags),
            ..Default::default()
        }
    }
}
