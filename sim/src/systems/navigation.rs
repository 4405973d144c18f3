//! Navigation probe - the set of cells navigators can reach.
//!
//! The probe is recomputed only when the grid reports solidity changes or a
//! navigator's cell changes. After each recompute it diffs the old and new
//! sets and reports the changed cells on [`Layer::Reachability`] as a single
//! change, which wakes each monitor watching any of those cells once.

use crate::components::*;
use crate::grid::{Cell, CellGrid};
use crate::spatial::{Extent, Layer, RegionIndex};
use bevy_ecs::prelude::*;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Cached flood fill from all navigator cells.
#[derive(Resource, Debug, Default)]
pub struct NavProbe {
    reachable: HashSet<Cell>,
    /// Sorted, deduplicated origin cells used for the current set.
    origins: Vec<Cell>,
    /// Number of recomputes so far.
    generation: u64,
}

impl NavProbe {
    #[inline]
    pub fn is_reachable(&self, cell: Cell) -> bool {
        self.reachable.contains(&cell)
    }

    pub fn reachable_count(&self) -> usize {
        self.reachable.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 4-connected breadth-first fill over passable cells.
    pub fn flood(grid: &CellGrid, origins: &[Cell]) -> HashSet<Cell> {
        let mut seen = HashSet::new();
        let mut frontier = VecDeque::new();
        for &origin in origins {
            if grid.is_passable(origin) && seen.insert(origin) {
                frontier.push_back(origin);
            }
        }
        while let Some(cell) = frontier.pop_front() {
            for next in cell.neighbours() {
                if grid.is_passable(next) && seen.insert(next) {
                    frontier.push_back(next);
                }
            }
        }
        seen
    }

    /// Recompute from `origins` and return the cells whose reachability
    /// flipped, sorted.
    pub fn recompute(&mut self, grid: &CellGrid, origins: Vec<Cell>) -> Vec<Cell> {
        let next = Self::flood(grid, &origins);
        let mut changed: Vec<Cell> = self.reachable.symmetric_difference(&next).copied().collect();
        changed.sort_unstable();
        self.reachable = next;
        self.origins = origins;
        self.generation += 1;
        changed
    }
}

/// System that refreshes the probe and reports changed cells.
pub fn nav_probe_system(
    mut probe: ResMut<NavProbe>,
    mut grid: ResMut<CellGrid>,
    mut index: ResMut<RegionIndex>,
    navigators: Query<&Position, (With<Navigator>, Without<PendingRemoval>)>,
) {
    let mut origins: Vec<Cell> = navigators
        .iter()
        .map(|p| grid.world_to_cell(p.x, p.y))
        .filter(|c| grid.is_passable(*c))
        .collect();
    origins.sort_unstable();
    origins.dedup();

    let dirty = grid.take_dirty_cells();
    if dirty.is_empty() && origins == probe.origins && probe.generation > 0 {
        return;
    }

    let changed = probe.recompute(&grid, origins);
    let areas: Vec<Extent> = changed.iter().map(|c| Extent::cell(c.x, c.y)).collect();
    let woken = index.trigger_all(Layer::Reachability, &areas);
    debug!(
        dirty = dirty.len(),
        changed = changed.len(),
        reachable = probe.reachable_count(),
        woken,
        "navigation probe recomputed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{ChangeCallback, RegionChange};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_flood_stops_at_walls() {
        let mut grid = CellGrid::new(5, 1, 1.0);
        grid.set_solid(Cell::new(2, 0), true).unwrap();
        let set = NavProbe::flood(&grid, &[Cell::new(0, 0)]);
        assert!(set.contains(&Cell::new(1, 0)));
        assert!(!set.contains(&Cell::new(2, 0)));
        assert!(!set.contains(&Cell::new(3, 0)));
    }

    #[test]
    fn test_recompute_reports_flipped_cells() {
        let mut grid = CellGrid::new(4, 1, 1.0);
        let mut probe = NavProbe::default();
        let first = probe.recompute(&grid, vec![Cell::new(0, 0)]);
        assert_eq!(first.len(), 4);

        grid.set_solid(Cell::new(1, 0), true).unwrap();
        let changed = probe.recompute(&grid, vec![Cell::new(0, 0)]);
        assert_eq!(changed, vec![Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0)]);
        assert!(probe.is_reachable(Cell::new(0, 0)));
        assert!(!probe.is_reachable(Cell::new(3, 0)));
    }

    #[test]
    fn test_system_skips_when_nothing_changed() {
        let mut world = World::new();
        world.insert_resource(CellGrid::new(4, 4, 1.0));
        world.insert_resource(RegionIndex::new(4));
        world.insert_resource(NavProbe::default());
        world.spawn((Position::new(0.5, 0.5), Navigator));

        let mut schedule = Schedule::default();
        schedule.add_systems(nav_probe_system);
        schedule.run(&mut world);
        schedule.run(&mut world);
        assert_eq!(world.resource::<NavProbe>().generation(), 1);
        assert_eq!(world.resource::<NavProbe>().reachable_count(), 16);

        world
            .resource_mut::<CellGrid>()
            .set_solid(Cell::new(3, 3), true)
            .unwrap();
        schedule.run(&mut world);
        assert_eq!(world.resource::<NavProbe>().generation(), 2);
        assert_eq!(world.resource::<NavProbe>().reachable_count(), 15);
    }

    #[test]
    fn test_recompute_wakes_a_wide_listener_once() {
        let mut world = World::new();
        world.insert_resource(CellGrid::new(10, 10, 1.0));
        world.insert_resource(NavProbe::default());
        world.spawn((Position::new(0.5, 0.5), Navigator));

        let mut index = RegionIndex::new(2);
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: ChangeCallback = Box::new(move |_: &RegionChange| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        index.insert(Layer::Reachability, Extent::new(6, 3, 4, 4), Entity::from_raw(99), Some(callback));
        world.insert_resource(index);

        let mut schedule = Schedule::default();
        schedule.add_systems(nav_probe_system);
        schedule.run(&mut world);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A full-height wall cuts off every cell under the listener
        {
            let mut grid = world.resource_mut::<CellGrid>();
            for y in 0..10 {
                grid.set_solid(Cell::new(5, y), true).unwrap();
            }
        }
        schedule.run(&mut world);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(world.resource::<RegionIndex>().notifications_sent(), 2);
    }
}
