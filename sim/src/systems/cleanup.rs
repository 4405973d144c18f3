//! Cleanup system - deferred destruction.
//!
//! Anything that decides an entity must go during the tick inserts
//! [`PendingRemoval`]. This runs last: it releases the entity's index
//! entries while the entity is still intact, then despawns it.

use crate::components::*;
use crate::grid::CellGrid;
use crate::lifecycle::release_tokens;
use crate::spatial::RegionIndex;
use crate::systems::reachability::ReachabilityMonitor;
use bevy_ecs::prelude::*;
use tracing::debug;

/// System that removes entities scheduled for removal.
pub fn cleanup_system(
    mut commands: Commands,
    mut index: ResMut<RegionIndex>,
    mut grid: ResMut<CellGrid>,
    mut query: Query<(
        Entity,
        &PendingRemoval,
        Option<&OccupantToken>,
        Option<&mut ReachabilityMonitor>,
        Has<CaptureStructure>,
    )>,
) {
    let mut removed = 0usize;
    for (entity, pending, occupant, monitor, is_structure) in query.iter_mut() {
        let watch = monitor.and_then(|mut m| m.detach());
        release_tokens(&mut index, occupant.map(|t| t.0), watch);
        if is_structure {
            grid.clear_structure(entity);
        }
        commands.entity(entity).despawn();
        debug!(?entity, reason = ?pending.0, "entity removed");
        removed += 1;
    }
    if removed > 0 {
        debug!(removed, "cleanup pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;
    use crate::spatial::{Extent, Layer};

    #[test]
    fn test_cleanup_releases_tokens_before_despawn() {
        let mut world = World::new();
        world.insert_resource(CellGrid::new(8, 8, 1.0));
        let mut index = RegionIndex::new(4);

        let keep = world.spawn(Position::new(1.5, 1.5)).id();
        let doomed = world.spawn(Position::new(2.5, 2.5)).id();
        let kept_token = index.insert(Layer::Living, Extent::cell(1, 1), keep, None);
        let doomed_token = index.insert(Layer::Living, Extent::cell(2, 2), doomed, None);
        world.entity_mut(keep).insert(OccupantToken(kept_token));
        world.entity_mut(doomed).insert((
            OccupantToken(doomed_token),
            PendingRemoval(RemovalReason::Despawned),
        ));
        world.insert_resource(index);

        let mut schedule = Schedule::default();
        schedule.add_systems(cleanup_system);
        schedule.run(&mut world);

        let index = world.resource::<RegionIndex>();
        assert_eq!(index.len(), 1);
        assert!(index.contains(kept_token));
        assert!(!index.contains(doomed_token));
        assert!(world.get_entity(doomed).is_err());
        assert!(world.get_entity(keep).is_ok());
    }

    #[test]
    fn test_cleanup_clears_structure_cell() {
        let mut world = World::new();
        world.insert_resource(RegionIndex::new(4));
        let mut grid = CellGrid::new(8, 8, 1.0);
        let structure = world
            .spawn((CaptureStructure::new(5.0), PendingRemoval(RemovalReason::Despawned)))
            .id();
        grid.place_structure(Cell::new(3, 3), structure).unwrap();
        world.insert_resource(grid);

        let mut schedule = Schedule::default();
        schedule.add_systems(cleanup_system);
        schedule.run(&mut world);

        assert_eq!(world.resource::<CellGrid>().structure_at(Cell::new(3, 3)), None);
    }
}
