//! Host lifecycle - explicit spawn and cleanup hooks.
//!
//! `init_*` registers an already-spawned entity with the region index (and,
//! for monitors, the reachability queue). `shutdown` releases every index
//! entry the entity owns and despawns it. Both run outside the schedule with
//! exclusive world access, so they may act immediately; systems use
//! [`PendingRemoval`] and the cleanup pass instead.

use crate::components::*;
use crate::error::SimError;
use crate::grid::{Cell, CellGrid};
use crate::spatial::{Extent, Layer, RegionIndex, RegionToken};
use crate::systems::reachability::{ReachabilityMonitor, ReachabilityQueue};
use bevy_ecs::prelude::*;
use tracing::{debug, warn};

fn position_of(world: &World, entity: Entity) -> Result<Position, SimError> {
    let entity_ref = world.get_entity(entity).map_err(|_| SimError::UnknownEntity(entity))?;
    entity_ref.get::<Position>().copied().ok_or_else(|| {
        warn!(?entity, "lifecycle init without Position; ignoring");
        SimError::MissingComponent {
            entity,
            component: "Position",
        }
    })
}

fn cell_of(world: &World, pos: Position) -> Cell {
    world.resource::<CellGrid>().world_to_cell(pos.x, pos.y)
}

/// Register an occupant entry on `layer` and record its starting cell.
fn init_occupant(world: &mut World, entity: Entity, layer: Layer) -> Result<Cell, SimError> {
    let pos = position_of(world, entity)?;
    let cell = cell_of(world, pos);
    if let Some(existing) = world.get::<OccupantToken>(entity) {
        debug_assert!(world.resource::<RegionIndex>().contains(existing.0));
        return Ok(cell);
    }
    let token = world
        .resource_mut::<RegionIndex>()
        .insert(layer, Extent::cell(cell.x, cell.y), entity, None);
    world
        .entity_mut(entity)
        .insert((OccupantToken(token), LastCell(cell)));
    Ok(cell)
}

/// Register a radbolt. A bolt spawned outside the grid is despawned at once.
pub fn init_radbolt(world: &mut World, entity: Entity) -> Result<(), SimError> {
    if world.get::<Radbolt>(entity).is_none() {
        return Err(SimError::MissingComponent {
            entity,
            component: "Radbolt",
        });
    }
    let pos = position_of(world, entity)?;
    let cell = cell_of(world, pos);
    if !world.resource::<CellGrid>().is_valid(cell) {
        warn!(?entity, x = cell.x, y = cell.y, "radbolt spawned outside the grid");
        world.despawn(entity);
        return Err(SimError::InvalidCell { x: cell.x, y: cell.y });
    }
    init_occupant(world, entity, Layer::Radbolts)?;
    Ok(())
}

/// Register a creature or colonist so radbolts can find it.
pub fn init_living(world: &mut World, entity: Entity) -> Result<(), SimError> {
    init_occupant(world, entity, Layer::Living)?;
    Ok(())
}

/// Attach a reachability monitor's listener entry and queue the first
/// computation. The monitor stays `Pending` until then.
pub fn init_monitor(world: &mut World, entity: Entity) -> Result<(), SimError> {
    let pos = position_of(world, entity)?;
    let cell = cell_of(world, pos);
    let extent = match world.get::<ReachabilityMonitor>(entity) {
        Some(monitor) if monitor.is_attached() => return Ok(()),
        Some(monitor) => monitor.watch_extent(cell),
        None => {
            return Err(SimError::MissingComponent {
                entity,
                component: "ReachabilityMonitor",
            })
        }
    };

    let callback = world.resource::<ReachabilityQueue>().listener(entity);
    let token = world
        .resource_mut::<RegionIndex>()
        .insert(Layer::Reachability, extent, entity, Some(callback));
    if let Some(mut monitor) = world.get_mut::<ReachabilityMonitor>(entity) {
        monitor.attach(token, cell);
    }
    world.resource_mut::<ReachabilityQueue>().enqueue(entity);
    debug!(?entity, %extent, "reachability monitor attached");
    Ok(())
}

/// Release index entries held by an entity's components.
pub(crate) fn release_tokens(
    index: &mut RegionIndex,
    occupant: Option<RegionToken>,
    watch: Option<RegionToken>,
) {
    for token in occupant.into_iter().chain(watch) {
        index.remove(token);
    }
}

/// Release everything the entity owns and despawn it.
pub fn shutdown(world: &mut World, entity: Entity) -> Result<(), SimError> {
    if world.get_entity(entity).is_err() {
        return Err(SimError::UnknownEntity(entity));
    }
    let occupant = world.get::<OccupantToken>(entity).map(|t| t.0);
    let watch = world
        .get_mut::<ReachabilityMonitor>(entity)
        .and_then(|mut m| m.detach());
    release_tokens(&mut world.resource_mut::<RegionIndex>(), occupant, watch);

    if world.get::<CaptureStructure>(entity).is_some() {
        world.resource_mut::<CellGrid>().clear_structure(entity);
    }
    world.despawn(entity);
    debug!(?entity, "entity shut down");
    Ok(())
}
