//! Gridwatch - Simulation Core
//!
//! A deterministic, fixed-timestep ECS simulation of a colony grid: a
//! bucketed region index with change notifications, incremental
//! reachability tracking and fast radbolt collision checks.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod spatial;
pub mod systems;
pub mod world;

pub use api::SimWorld;
pub use components::*;
pub use config::SimConfig;
pub use error::SimError;
pub use grid::{Cell, CellGrid, GridSnapshot};
pub use spatial::{ChangeCallback, Extent, Layer, RegionChange, RegionIndex, RegionToken};
pub use systems::*;
pub use world::{SaveState, Snapshot};
