//! Reachability tracking - event-driven instead of polled.
//!
//! Every monitored entity owns a listener entry on [`Layer::Reachability`]
//! covering the cells it can be accessed from. The navigation probe reports
//! flipped cells on that layer; the listener callback only pushes the entity
//! into a channel, and the entity is recomputed later in the tick in a
//! batched pass. Entities whose neighbourhood did not change are never
//! touched.
//!
//! ## Phases
//!
//! 1. **Watch** (`reachability_watch_system`) - moves listener extents for
//!    monitors whose own cell changed and queues them.
//! 2. **Gather** (`reachability_update_system`) - drains at most
//!    `SimConfig::reachability_budget` queued entities and evaluates them
//!    against the probe. Read-only; parallel with the `parallel` feature.
//! 3. **Apply** - writes states and records `Reachable <-> Unreachable` flips.

use crate::components::*;
use crate::config::SimConfig;
use crate::grid::{Cell, CellGrid};
use crate::spatial::{ChangeCallback, Extent, RegionIndex, RegionToken};
use crate::systems::navigation::NavProbe;
use bevy_ecs::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Reachability of a monitored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReachabilityState {
    /// Not computed yet.
    #[default]
    Pending,
    Reachable,
    Unreachable,
}

impl ReachabilityState {
    /// Apply a computed result. Returns true when the transition must be
    /// reported: leaving `Pending` never is, a flip always is.
    pub fn transition(&mut self, reachable: bool) -> bool {
        let next = if reachable {
            ReachabilityState::Reachable
        } else {
            ReachabilityState::Unreachable
        };
        let report = matches!(
            (*self, next),
            (ReachabilityState::Reachable, ReachabilityState::Unreachable)
                | (ReachabilityState::Unreachable, ReachabilityState::Reachable)
        );
        *self = next;
        report
    }
}

/// Tracks whether an entity can be reached from any navigator.
#[derive(Component, Debug, Clone)]
pub struct ReachabilityMonitor {
    pub state: ReachabilityState,
    /// Cells relative to the entity's own cell from which it can be worked.
    pub offsets: Vec<(i32, i32)>,
    watch: Option<RegionToken>,
    last_cell: Option<Cell>,
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new(vec![(0, 0)])
    }
}

impl ReachabilityMonitor {
    /// An empty offset list means "the entity's own cell".
    pub fn new(offsets: Vec<(i32, i32)>) -> Self {
        let offsets = if offsets.is_empty() { vec![(0, 0)] } else { offsets };
        Self {
            state: ReachabilityState::Pending,
            offsets,
            watch: None,
            last_cell: None,
        }
    }

    pub fn watch_token(&self) -> Option<RegionToken> {
        self.watch
    }

    pub fn is_attached(&self) -> bool {
        self.watch.is_some()
    }

    /// Access cells for an entity standing in `origin`.
    pub fn cells(&self, origin: Cell) -> impl Iterator<Item = Cell> + '_ {
        self.offsets.iter().map(move |&(dx, dy)| origin.offset(dx, dy))
    }

    /// Bounding extent of the access cells.
    pub fn watch_extent(&self, origin: Cell) -> Extent {
        Extent::bounding(self.cells(origin).map(|c| (c.x, c.y)))
            .unwrap_or_else(|| Extent::cell(origin.x, origin.y))
    }

    pub(crate) fn attach(&mut self, token: RegionToken, cell: Cell) {
        self.watch = Some(token);
        self.last_cell = Some(cell);
    }

    pub(crate) fn detach(&mut self) -> Option<RegionToken> {
        self.last_cell = None;
        self.watch.take()
    }
}

/// Emitted on every `Reachable <-> Unreachable` flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityChanged {
    pub entity: Entity,
    pub reachable: bool,
}

/// Flips recorded this tick.
#[derive(Resource, Debug, Default)]
pub struct ReachabilityEventBuffer {
    pub events: Vec<ReachabilityChanged>,
}

impl ReachabilityEventBuffer {
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Entities waiting for recomputation.
///
/// Listener callbacks hold a [`Sender`]; the queue drains the channel into an
/// insertion-ordered set so duplicate wake-ups collapse.
#[derive(Resource, Debug)]
pub struct ReachabilityQueue {
    sender: Sender<Entity>,
    receiver: Receiver<Entity>,
    pending: IndexSet<Entity>,
}

impl Default for ReachabilityQueue {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            pending: IndexSet::new(),
        }
    }
}

impl ReachabilityQueue {
    /// Listener callback that queues `entity`.
    pub fn listener(&self, entity: Entity) -> ChangeCallback {
        let sender = self.sender.clone();
        Box::new(move |_| {
            // The receiver lives as long as the queue; a failed send means
            // the world is being torn down.
            let _ = sender.send(entity);
        })
    }

    pub fn enqueue(&mut self, entity: Entity) {
        self.pending.insert(entity);
    }

    /// Distinct entities waiting, including undrained wake-ups.
    pub fn len(&mut self) -> usize {
        self.drain_channel();
        self.pending.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Take up to `budget` entities in arrival order.
    pub fn take(&mut self, budget: usize) -> Vec<Entity> {
        self.drain_channel();
        let n = budget.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    fn drain_channel(&mut self) {
        for entity in self.receiver.try_iter() {
            self.pending.insert(entity);
        }
    }
}

/// System that follows monitored entities as they move.
pub fn reachability_watch_system(
    grid: Res<CellGrid>,
    mut index: ResMut<RegionIndex>,
    mut queue: ResMut<ReachabilityQueue>,
    mut warned: Local<HashSet<Entity>>,
    mut query: Query<(Entity, &mut ReachabilityMonitor, Option<&Position>), Without<PendingRemoval>>,
) {
    for (entity, mut monitor, pos) in query.iter_mut() {
        let Some(token) = monitor.watch else { continue };
        let Some(pos) = pos else {
            if warned.insert(entity) {
                warn!(?entity, "reachability monitor without Position; skipping");
            }
            continue;
        };
        let cell = grid.world_to_cell(pos.x, pos.y);
        if monitor.last_cell == Some(cell) {
            continue;
        }
        let extent = monitor.watch_extent(cell);
        index.update(token, extent);
        monitor.last_cell = Some(cell);
        queue.enqueue(entity);
    }
}

/// Read-only input for the gather phase.
struct ProbeRequest {
    entity: Entity,
    cells: Vec<Cell>,
}

/// System that recomputes queued monitors within the per-tick budget.
pub fn reachability_update_system(
    config: Res<SimConfig>,
    grid: Res<CellGrid>,
    probe: Res<NavProbe>,
    mut queue: ResMut<ReachabilityQueue>,
    mut events: ResMut<ReachabilityEventBuffer>,
    mut monitors: Query<(&mut ReachabilityMonitor, Option<&Position>), Without<PendingRemoval>>,
) {
    let batch = queue.take(config.reachability_budget);
    if batch.is_empty() {
        return;
    }

    // GATHER: copy out what each request needs
    let requests: Vec<ProbeRequest> = batch
        .iter()
        .filter_map(|&entity| {
            let (monitor, pos) = monitors.get(entity).ok()?;
            let pos = pos?;
            let origin = grid.world_to_cell(pos.x, pos.y);
            Some(ProbeRequest {
                entity,
                cells: monitor.cells(origin).collect(),
            })
        })
        .collect();

    let probe: &NavProbe = &probe;
    let evaluate = |r: &ProbeRequest| (r.entity, r.cells.iter().any(|&c| probe.is_reachable(c)));

    #[cfg(feature = "parallel")]
    let results: Vec<(Entity, bool)> = requests.par_iter().map(evaluate).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Entity, bool)> = requests.iter().map(evaluate).collect();

    // APPLY
    let mut flips = 0;
    for (entity, reachable) in results {
        let Ok((mut monitor, _)) = monitors.get_mut(entity) else { continue };
        if monitor.state.transition(reachable) {
            events.events.push(ReachabilityChanged { entity, reachable });
            flips += 1;
        }
    }
    debug!(recomputed = batch.len(), flips, "reachability batch");
}
