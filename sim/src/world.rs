//! Simulation world container and snapshot types.
//!
//! [`Snapshot`] is a serializable per-tick view for clients and tooling.
//! [`SaveState`] is the persistent form of the world: only authored data is
//! stored. Index tokens, reachability states and the navigation cache are
//! derived and are rebuilt on load.

use crate::components::*;
use crate::config::SimConfig;
use crate::grid::{CellGrid, GridSnapshot};
use crate::spatial::RegionIndex;
use crate::systems::navigation::NavProbe;
use crate::systems::radbolt::{CollisionEventBuffer, CollisionKind};
use crate::systems::reachability::{ReachabilityEventBuffer, ReachabilityMonitor, ReachabilityState};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single radbolt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadboltSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub payload: f32,
    pub heading: Heading,
}

/// Snapshot of a living entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivingSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub health_max: f32,
    pub dose: f32,
    pub tags: Tags,
    pub navigator: bool,
}

/// Snapshot of a capture structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub accepts_input: bool,
    pub stored: f32,
    pub capacity: f32,
}

/// Snapshot of a reachability monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub state: ReachabilityState,
}

/// A collision recorded this tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionSnapshot {
    pub radbolt: u64,
    pub cell_x: i32,
    pub cell_y: i32,
    pub kind: String,
    /// Structure, surviving radbolt or living target involved, if any.
    pub other: Option<u64>,
}

/// A reachability flip recorded this tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilitySnapshot {
    pub id: u64,
    pub reachable: bool,
}

/// Region index counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub entries: usize,
    pub buckets: usize,
    pub notifications_sent: u64,
}

/// Complete per-tick view of the simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub radbolts: Vec<RadboltSnapshot>,
    pub living: Vec<LivingSnapshot>,
    pub structures: Vec<StructureSnapshot>,
    pub monitors: Vec<MonitorSnapshot>,
    /// Collisions resolved this tick.
    pub collisions: Vec<CollisionSnapshot>,
    /// Reachability flips this tick.
    pub reachability_changes: Vec<ReachabilitySnapshot>,
    /// Cells currently reachable by navigators.
    pub reachable_cells: usize,
    pub index: IndexStats,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut radbolts: Vec<RadboltSnapshot> = world
            .query_filtered::<(Entity, &Position, &Radbolt), Without<PendingRemoval>>()
            .iter(world)
            .map(|(e, pos, bolt)| RadboltSnapshot {
                id: e.to_bits(),
                x: pos.x,
                y: pos.y,
                payload: bolt.payload,
                heading: bolt.heading,
            })
            .collect();
        radbolts.sort_by_key(|r| r.id);

        let mut living: Vec<LivingSnapshot> = world
            .query::<(Entity, &Position, &Health, &TagSet, Option<&Exposure>, Has<Navigator>)>()
            .iter(world)
            .map(|(e, pos, health, tags, exposure, navigator)| LivingSnapshot {
                id: e.to_bits(),
                x: pos.x,
                y: pos.y,
                health: health.current,
                health_max: health.max,
                dose: exposure.map_or(0.0, |x| x.dose),
                tags: tags.0,
                navigator,
            })
            .collect();
        living.sort_by_key(|l| l.id);

        let mut structures: Vec<StructureSnapshot> = world
            .query::<(Entity, &Position, &CaptureStructure)>()
            .iter(world)
            .map(|(e, pos, capture)| StructureSnapshot {
                id: e.to_bits(),
                x: pos.x,
                y: pos.y,
                accepts_input: capture.accepts_input,
                stored: capture.stored,
                capacity: capture.capacity,
            })
            .collect();
        structures.sort_by_key(|s| s.id);

        let mut monitors: Vec<MonitorSnapshot> = world
            .query::<(Entity, &Position, &ReachabilityMonitor)>()
            .iter(world)
            .map(|(e, pos, monitor)| MonitorSnapshot {
                id: e.to_bits(),
                x: pos.x,
                y: pos.y,
                state: monitor.state,
            })
            .collect();
        monitors.sort_by_key(|m| m.id);

        let collisions = world
            .get_resource::<CollisionEventBuffer>()
            .map(|buffer| {
                buffer
                    .events
                    .iter()
                    .map(|event| CollisionSnapshot {
                        radbolt: event.radbolt.to_bits(),
                        cell_x: event.cell.x,
                        cell_y: event.cell.y,
                        kind: event.kind.name().to_string(),
                        other: match event.kind {
                            CollisionKind::Captured { structure } => Some(structure.to_bits()),
                            CollisionKind::Merged { into } => Some(into.to_bits()),
                            CollisionKind::HitLiving { target } => Some(target.to_bits()),
                            _ => None,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        let reachability_changes = world
            .get_resource::<ReachabilityEventBuffer>()
            .map(|buffer| {
                buffer
                    .events
                    .iter()
                    .map(|event| ReachabilitySnapshot {
                        id: event.entity.to_bits(),
                        reachable: event.reachable,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let reachable_cells = world
            .get_resource::<NavProbe>()
            .map_or(0, |probe| probe.reachable_count());

        let index = world
            .get_resource::<RegionIndex>()
            .map(|index| IndexStats {
                entries: index.len(),
                buckets: index.bucket_count(),
                notifications_sent: index.notifications_sent(),
            })
            .unwrap_or_default();

        Self {
            tick,
            time,
            radbolts,
            living,
            structures,
            monitors,
            collisions,
            reachability_changes,
            reachable_cells,
            index,
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// SAVE STATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRadbolt {
    pub position: Position,
    pub radbolt: Radbolt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedLiving {
    pub position: Position,
    pub velocity: Velocity,
    pub health: Health,
    pub tags: Tags,
    pub exposure: Option<Exposure>,
    pub navigator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStructure {
    pub position: Position,
    pub capture: CaptureStructure,
}

/// Monitored entities keep their access offsets only; state starts over as
/// `Pending` after a load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedMonitor {
    pub position: Position,
    pub offsets: Vec<(i32, i32)>,
}

/// Persistent world state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub tick: u64,
    pub time: f32,
    pub config: SimConfig,
    pub grid: GridSnapshot,
    pub radbolts: Vec<SavedRadbolt>,
    pub living: Vec<SavedLiving>,
    pub structures: Vec<SavedStructure>,
    pub monitors: Vec<SavedMonitor>,
}

impl SaveState {
    /// Capture the authored state of the world. Entities already scheduled
    /// for removal are left out.
    pub fn capture(world: &mut World, tick: u64, time: f32) -> Self {
        let config = world.get_resource::<SimConfig>().cloned().unwrap_or_default();
        let grid = world
            .get_resource::<CellGrid>()
            .map(GridSnapshot::from_grid)
            .unwrap_or_else(|| GridSnapshot::from_grid(&CellGrid::default()));

        let mut radbolts: Vec<(Entity, SavedRadbolt)> = world
            .query_filtered::<(Entity, &Position, &Radbolt), Without<PendingRemoval>>()
            .iter(world)
            .map(|(e, position, radbolt)| {
                (e, SavedRadbolt { position: *position, radbolt: *radbolt })
            })
            .collect();
        radbolts.sort_by_key(|(e, _)| *e);

        let mut living: Vec<(Entity, SavedLiving)> = world
            .query_filtered::<(
                Entity,
                &Position,
                Option<&Velocity>,
                &Health,
                &TagSet,
                Option<&Exposure>,
                Has<Navigator>,
            ), Without<PendingRemoval>>()
            .iter(world)
            .map(|(e, position, velocity, health, tags, exposure, navigator)| {
                (
                    e,
                    SavedLiving {
                        position: *position,
                        velocity: velocity.copied().unwrap_or_default(),
                        health: *health,
                        tags: tags.0,
                        exposure: exposure.copied(),
                        navigator,
                    },
                )
            })
            .collect();
        living.sort_by_key(|(e, _)| *e);

        let mut structures: Vec<(Entity, SavedStructure)> = world
            .query_filtered::<(Entity, &Position, &CaptureStructure), Without<PendingRemoval>>()
            .iter(world)
            .map(|(e, position, capture)| {
                (e, SavedStructure { position: *position, capture: *capture })
            })
            .collect();
        structures.sort_by_key(|(e, _)| *e);

        let mut monitors: Vec<(Entity, SavedMonitor)> = world
            .query_filtered::<(Entity, &Position, &ReachabilityMonitor), Without<PendingRemoval>>()
            .iter(world)
            .map(|(e, position, monitor)| {
                (
                    e,
                    SavedMonitor {
                        position: *position,
                        offsets: monitor.offsets.clone(),
                    },
                )
            })
            .collect();
        monitors.sort_by_key(|(e, _)| *e);

        Self {
            tick,
            time,
            config,
            grid,
            radbolts: radbolts.into_iter().map(|(_, r)| r).collect(),
            living: living.into_iter().map(|(_, l)| l).collect(),
            structures: structures.into_iter().map(|(_, s)| s).collect(),
            monitors: monitors.into_iter().map(|(_, m)| m).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;

    #[test]
    fn test_snapshot_skips_doomed_radbolts() {
        let mut world = World::new();
        world.spawn(RadboltBundle::new(1.0, 1.0, Radbolt::new(2.0, 1.0, Heading::Right, 0.1)));
        world.spawn((
            RadboltBundle::new(2.0, 2.0, Radbolt::new(2.0, 1.0, Heading::Right, 0.1)),
            PendingRemoval(RemovalReason::Solid),
        ));
        world.spawn(LivingBundle::new(3.0, 3.0, Tags::COLONIST));

        let snapshot = Snapshot::from_world(&mut world, 7, 0.5);
        assert_eq!(snapshot.tick, 7);
        assert_eq!(snapshot.radbolts.len(), 1);
        assert_eq!(snapshot.living.len(), 1);
        assert!(!snapshot.living[0].navigator);
        assert!(snapshot.collisions.is_empty());
        assert_eq!(snapshot.index.entries, 0);
    }

    #[test]
    fn test_save_state_excludes_derived_data() {
        let mut world = World::new();
        let mut grid = CellGrid::new(8, 8, 1.0);
        grid.set_solid(Cell::new(1, 1), true).unwrap();
        world.insert_resource(grid);
        world.insert_resource(SimConfig::default());

        let mut monitor = ReachabilityMonitor::new(vec![(1, 0)]);
        monitor.state = ReachabilityState::Unreachable;
        world.spawn((Position::new(4.5, 4.5), monitor));
        world.spawn((LivingBundle::new(2.5, 2.5, Tags::COLONIST), Navigator));

        let state = SaveState::capture(&mut world, 3, 0.1);
        assert_eq!(state.grid.solid, vec![Cell::new(1, 1)]);
        assert_eq!(state.monitors.len(), 1);
        assert_eq!(state.monitors[0].offsets, vec![(1, 0)]);
        assert!(state.living[0].navigator);

        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("Unreachable"));
    }
}
