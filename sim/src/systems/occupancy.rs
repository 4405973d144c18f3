//! Occupancy system - keeps living entities' index entries in step with
//! their positions.

use crate::components::*;
use crate::grid::CellGrid;
use crate::spatial::{Extent, RegionIndex};
use bevy_ecs::prelude::*;

/// Update a living entity's entry only when its covered cell changes.
/// Sub-cell movement is a no-op.
pub fn occupancy_system(
    grid: Res<CellGrid>,
    mut index: ResMut<RegionIndex>,
    mut query: Query<
        (&Position, &mut LastCell, &OccupantToken),
        (Without<Radbolt>, Without<PendingRemoval>),
    >,
) {
    for (pos, mut last, token) in query.iter_mut() {
        let cell = grid.world_to_cell(pos.x, pos.y);
        if cell == last.0 {
            continue;
        }
        last.0 = cell;
        index.update(token.0, Extent::cell(cell.x, cell.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;
    use crate::spatial::Layer;

    #[test]
    fn test_occupancy_follows_cell_changes() {
        let mut world = World::new();
        world.insert_resource(CellGrid::new(10, 10, 1.0));
        let mut index = RegionIndex::new(4);

        let e = world.spawn(Position::new(0.5, 0.5)).id();
        let token = index.insert(Layer::Living, Extent::cell(0, 0), e, None);
        world
            .entity_mut(e)
            .insert((LastCell(Cell::new(0, 0)), OccupantToken(token)));
        world.insert_resource(index);

        let mut schedule = Schedule::default();
        schedule.add_systems(occupancy_system);

        // Sub-cell movement keeps the old extent
        world.get_mut::<Position>(e).unwrap().x = 0.9;
        schedule.run(&mut world);
        assert_eq!(world.resource::<RegionIndex>().extent(token), Some(Extent::cell(0, 0)));

        world.get_mut::<Position>(e).unwrap().x = 3.2;
        schedule.run(&mut world);
        assert_eq!(world.resource::<RegionIndex>().extent(token), Some(Extent::cell(3, 0)));
        assert_eq!(world.get::<LastCell>(e).unwrap().0, Cell::new(3, 0));
    }
}
