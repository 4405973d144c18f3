//! Radbolt system - movement, payload falloff and collisions.
//!
//! A radbolt is only re-evaluated on ticks where it crosses into a new cell.
//! Collision checks then run in a fixed order and stop at the first hit:
//!
//! 1. **Structure** - a capture structure in the cell that can take input
//!    absorbs the bolt. One that cannot makes the cell pass-through for the
//!    solid check, and checking continues.
//! 2. **Solid** - a solid cell (not pass-through) stops the bolt.
//! 3. **Radbolt** - another live bolt within `merge_distance_sq` absorbs this
//!    bolt's payload.
//! 4. **Living** - the first qualifying living target in the cell takes
//!    damage (and exposure, if enabled).
//!
//! This order is a contract; tests pin it. Every terminal outcome inserts
//! [`PendingRemoval`] and the cleanup pass removes the bolt at the end of the
//! tick.

use crate::components::*;
use crate::config::SimConfig;
use crate::grid::{Cell, CellGrid};
use crate::spatial::{Extent, Layer, RegionIndex};
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What happened to a radbolt this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// Left the grid.
    OutOfBounds,
    /// Payload ran out.
    Depleted,
    Captured { structure: Entity },
    Solid,
    Merged { into: Entity },
    HitLiving { target: Entity },
}

impl CollisionKind {
    pub fn removal_reason(&self) -> RemovalReason {
        match self {
            CollisionKind::OutOfBounds => RemovalReason::OutOfBounds,
            CollisionKind::Depleted => RemovalReason::Depleted,
            CollisionKind::Captured { .. } => RemovalReason::Captured,
            CollisionKind::Solid => RemovalReason::Solid,
            CollisionKind::Merged { .. } => RemovalReason::Merged,
            CollisionKind::HitLiving { .. } => RemovalReason::HitLiving,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CollisionKind::OutOfBounds => "OutOfBounds",
            CollisionKind::Depleted => "Depleted",
            CollisionKind::Captured { .. } => "Captured",
            CollisionKind::Solid => "Solid",
            CollisionKind::Merged { .. } => "Merged",
            CollisionKind::HitLiving { .. } => "HitLiving",
        }
    }
}

/// One terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    pub radbolt: Entity,
    pub cell: Cell,
    pub kind: CollisionKind,
}

/// Outcomes recorded this tick.
#[derive(Resource, Debug, Default)]
pub struct CollisionEventBuffer {
    pub events: Vec<CollisionEvent>,
}

impl CollisionEventBuffer {
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.kind.name() == name).count()
    }
}

/// Where a bolt ended up after moving this tick.
struct Step {
    cell: Cell,
    position: Position,
    payload: f32,
}

/// System that advances radbolts and resolves their collisions.
///
/// Bolts are processed in entity order so merges are deterministic.
#[allow(clippy::too_many_arguments)]
pub fn radbolt_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    grid: Res<CellGrid>,
    mut index: ResMut<RegionIndex>,
    mut events: ResMut<CollisionEventBuffer>,
    mut commands: Commands,
    mut warned: Local<HashSet<Entity>>,
    mut bolts: Query<
        (Entity, &mut Radbolt, &mut Position, &mut LastCell, Option<&OccupantToken>),
        Without<PendingRemoval>,
    >,
    mut structures: Query<&mut CaptureStructure>,
    mut living: Query<(&TagSet, &mut Health, Option<&mut Exposure>), Without<Radbolt>>,
) {
    let delta = dt.0;
    let mut order: Vec<Entity> = bolts.iter().map(|(entity, ..)| entity).collect();
    order.sort_unstable();

    // Bolts scheduled for removal this tick; commands are not applied yet.
    let mut doomed: HashSet<Entity> = HashSet::new();
    let mut finish = |entity: Entity, cell: Cell, kind: CollisionKind, doomed: &mut HashSet<Entity>| {
        doomed.insert(entity);
        commands.entity(entity).insert(PendingRemoval(kind.removal_reason()));
        events.events.push(CollisionEvent { radbolt: entity, cell, kind });
    };

    for entity in order {
        if doomed.contains(&entity) {
            continue;
        }

        // MOVE: advance, detect cell change, apply falloff
        let step = {
            let Ok((_, mut bolt, mut pos, mut last, token)) = bolts.get_mut(entity) else { continue };
            let (hx, hy) = bolt.heading.vector();
            pos.x += hx * bolt.speed * delta;
            pos.y += hy * bolt.speed * delta;

            let cell = grid.world_to_cell(pos.x, pos.y);
            if cell == last.0 {
                continue;
            }
            last.0 = cell;

            if !grid.is_valid(cell) {
                warn!(?entity, x = cell.x, y = cell.y, "radbolt left the grid");
                finish(entity, cell, CollisionKind::OutOfBounds, &mut doomed);
                continue;
            }

            bolt.payload -= bolt.falloff;
            if bolt.payload <= 0.0 {
                finish(entity, cell, CollisionKind::Depleted, &mut doomed);
                continue;
            }

            match token {
                Some(token) => index.update(token.0, Extent::cell(cell.x, cell.y)),
                None => {
                    if warned.insert(entity) {
                        warn!(?entity, "radbolt has no index entry; merges will not see it");
                    }
                }
            }

            Step {
                cell,
                position: *pos,
                payload: bolt.payload,
            }
        };
        let cell = step.cell;

        // 1. Structure
        let mut pass_through = false;
        if let Some(structure) = grid.structure_at(cell) {
            if let Ok(mut capture) = structures.get_mut(structure) {
                if capture.can_capture() {
                    capture.store(step.payload);
                    finish(entity, cell, CollisionKind::Captured { structure }, &mut doomed);
                    continue;
                }
                pass_through = true;
            }
        }

        // 2. Solid
        if !pass_through && grid.is_solid(cell) {
            finish(entity, cell, CollisionKind::Solid, &mut doomed);
            continue;
        }

        // 3. Radbolt merge
        let neighbours = index.query_layer(Layer::Radbolts, Extent::around(cell.x, cell.y, 1));
        let target = neighbours.into_iter().find(|&other| {
            other != entity
                && !doomed.contains(&other)
                && bolts
                    .get(other)
                    .is_ok_and(|(_, _, pos, _, _)| pos.distance_sq(&step.position) <= config.merge_distance_sq)
        });
        if let Some(other) = target {
            if let Ok((_, mut survivor, ..)) = bolts.get_mut(other) {
                survivor.payload += step.payload;
            }
            debug!(?entity, into = ?other, payload = step.payload, "radbolts merged");
            finish(entity, cell, CollisionKind::Merged { into: other }, &mut doomed);
            continue;
        }

        // 4. Living targets
        for target in index.query_layer(Layer::Living, Extent::cell(cell.x, cell.y)) {
            let Ok((tags, mut health, exposure)) = living.get_mut(target) else { continue };
            if !health.is_alive() || !tags.qualifies(config.eligible_tags, config.excluded_tags) {
                continue;
            }
            health.damage(config.living_hit_damage);
            if config.apply_exposure {
                if let Some(mut exposure) = exposure {
                    exposure.dose += step.payload;
                }
            }
            finish(entity, cell, CollisionKind::HitLiving { target }, &mut doomed);
            break;
        }
    }
}
