//! Public API for the simulation.
//!
//! This module is the host-facing surface: spawning, world edits, stepping
//! and persistence. Every spawner registers the entity's index entries
//! immediately, and `despawn` releases them before the entity goes away.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When `step(dt)` is called,
//! the simulation accumulates time and runs fixed updates as needed. Event buffers hold the
//! events of the most recent fixed update only.

use crate::components::*;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::grid::{Cell, CellGrid};
use crate::lifecycle;
use crate::spatial::RegionIndex;
use crate::systems::*;
use crate::world::{SaveState, Snapshot};
use bevy_ecs::prelude::*;
use tracing::{info, warn};

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Initializing the simulation
/// - Stepping the simulation forward
/// - Extracting snapshots and save states
/// - Editing the grid and its entities
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a world from options that have already passed
    /// [`SimConfig::validate`]. Host-supplied options should go through
    /// [`SimWorld::try_with_config`].
    pub fn try_with_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(%err, "simulation created with invalid options");
        }
        let mut world = World::new();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(CellGrid::new(
            config.grid_width,
            config.grid_height,
            config.cell_size,
        ));
        world.insert_resource(RegionIndex::new(config.bucket_size));
        world.insert_resource(NavProbe::default());
        world.insert_resource(ReachabilityQueue::default());
        world.insert_resource(ReachabilityEventBuffer::default());
        world.insert_resource(CollisionEventBuffer::default());
        info!(
            width = config.grid_width,
            height = config.grid_height,
            bucket_size = config.bucket_size,
            "simulation world created"
        );
        world.insert_resource(config);

        // One sequential group: the tracker needs the probe's reports, and
        // cleanup must see every removal marker from this tick.
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                movement_system,
                occupancy_system,
                nav_probe_system,
                reachability_watch_system,
                reachability_update_system,
                radbolt_system,
                cleanup_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
        }
    }

    /// Create a small colony for demonstration: a walled room with a door,
    /// colonists, creatures, monitored work spots and a capture structure.
    pub fn new_demo_world() -> Result<Self, SimError> {
        let mut sim = Self::with_config(SimConfig {
            grid_width: 32,
            grid_height: 32,
            ..Default::default()
        });

        // Room walls from (16, 8) to (26, 18), door on the west side
        for x in 16..=26 {
            sim.set_solid(x, 8, true)?;
            sim.set_solid(x, 18, true)?;
        }
        for y in 8..=18 {
            if y != 13 {
                sim.set_solid(16, y, true)?;
            }
            sim.set_solid(26, y, true)?;
        }

        sim.spawn_navigator(4.5, 4.5)?;
        sim.spawn_navigator(6.5, 20.5)?;
        for i in 0..4 {
            sim.spawn_living(8.5 + i as f32 * 2.0, 12.5, Tags::CREATURE)?;
        }

        sim.spawn_monitored(21.5, 13.5, vec![(-1, 0), (1, 0), (0, -1), (0, 1)])?;
        sim.spawn_monitored(2.5, 28.5, vec![])?;
        sim.spawn_capture_structure(12.5, 25.5, 50.0)?;

        sim.spawn_radbolt(2.5, 25.5, Heading::Right, 6.0, 5.0)?;
        sim.spawn_radbolt(8.5, 2.5, Heading::Up, 4.0, 3.0)?;
        sim.spawn_radbolt(30.5, 30.5, Heading::DownLeft, 5.0, 4.0)?;

        info!("demo world ready");
        Ok(sim)
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed. This ensures deterministic behavior regardless of frame rate.
    pub fn step(&mut self, dt: f32) {
        let fixed_dt = self.config().fixed_timestep;

        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run exactly `n` fixed updates, ignoring the accumulator.
    pub fn run_ticks(&mut self, n: usize) {
        let fixed_dt = self.config().fixed_timestep;
        for _ in 0..n {
            self.fixed_update(fixed_dt);
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        self.world.resource_mut::<DeltaTime>().0 = dt;
        self.world.resource_mut::<SimTick>().increment();
        self.world.resource_mut::<CollisionEventBuffer>().clear();
        self.world.resource_mut::<ReachabilityEventBuffer>().clear();

        self.schedule.run(&mut self.world);

        self.tick += 1;
        self.time += dt;
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Spawn a radbolt. Its falloff comes from the config.
    pub fn spawn_radbolt(
        &mut self,
        x: f32,
        y: f32,
        heading: Heading,
        speed: f32,
        payload: f32,
    ) -> Result<Entity, SimError> {
        let falloff = self.config().payload_falloff;
        self.insert_radbolt(Position::new(x, y), Radbolt::new(payload, speed, heading, falloff))
    }

    fn insert_radbolt(&mut self, position: Position, radbolt: Radbolt) -> Result<Entity, SimError> {
        let entity = self
            .world
            .spawn(RadboltBundle::new(position.x, position.y, radbolt))
            .id();
        lifecycle::init_radbolt(&mut self.world, entity)?;
        Ok(entity)
    }

    /// Spawn a creature or colonist.
    pub fn spawn_living(&mut self, x: f32, y: f32, tags: Tags) -> Result<Entity, SimError> {
        let entity = self.world.spawn(LivingBundle::new(x, y, tags)).id();
        lifecycle::init_living(&mut self.world, entity)?;
        Ok(entity)
    }

    /// Spawn a colonist whose cell seeds the navigation flood fill.
    pub fn spawn_navigator(&mut self, x: f32, y: f32) -> Result<Entity, SimError> {
        let entity = self
            .world
            .spawn((LivingBundle::new(x, y, Tags::COLONIST), Navigator))
            .id();
        lifecycle::init_living(&mut self.world, entity)?;
        Ok(entity)
    }

    /// Spawn a capture structure. Its cell becomes solid.
    pub fn spawn_capture_structure(
        &mut self,
        x: f32,
        y: f32,
        capacity: f32,
    ) -> Result<Entity, SimError> {
        self.insert_structure(Position::new(x, y), CaptureStructure::new(capacity))
    }

    fn insert_structure(
        &mut self,
        position: Position,
        capture: CaptureStructure,
    ) -> Result<Entity, SimError> {
        let cell = self.grid().world_to_cell(position.x, position.y);
        if !self.grid().is_valid(cell) {
            warn!(x = cell.x, y = cell.y, "capture structure outside the grid");
            return Err(SimError::InvalidCell { x: cell.x, y: cell.y });
        }
        let entity = self.world.spawn((position, capture)).id();
        self.world
            .resource_mut::<CellGrid>()
            .place_structure(cell, entity)?;
        Ok(entity)
    }

    /// Spawn an entity whose reachability is tracked. `offsets` are the
    /// cells, relative to its own, from which it can be reached; empty means
    /// its own cell.
    pub fn spawn_monitored(
        &mut self,
        x: f32,
        y: f32,
        offsets: Vec<(i32, i32)>,
    ) -> Result<Entity, SimError> {
        let entity = self
            .world
            .spawn((Position::new(x, y), ReachabilityMonitor::new(offsets)))
            .id();
        lifecycle::init_monitor(&mut self.world, entity)?;
        Ok(entity)
    }

    /// Remove an entity now, releasing its index entries first.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), SimError> {
        lifecycle::shutdown(&mut self.world, entity)
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Build or remove a wall. Reachability catches up on the next tick.
    pub fn set_solid(&mut self, x: i32, y: i32, solid: bool) -> Result<(), SimError> {
        self.world
            .resource_mut::<CellGrid>()
            .set_solid(Cell::new(x, y), solid)
    }

    /// Enable or disable a capture structure's input.
    pub fn set_capture_input(&mut self, entity: Entity, accepts: bool) -> Result<(), SimError> {
        let mut capture = self.world.get_mut::<CaptureStructure>(entity).ok_or(
            SimError::MissingComponent {
                entity,
                component: "CaptureStructure",
            },
        )?;
        capture.accepts_input = accepts;
        Ok(())
    }

    /// Teleport an entity. Index entries follow on the next tick.
    pub fn set_position(&mut self, entity: Entity, x: f32, y: f32) -> Result<(), SimError> {
        let mut pos = self
            .world
            .get_mut::<Position>(entity)
            .ok_or(SimError::MissingComponent {
                entity,
                component: "Position",
            })?;
        *pos = Position::new(x, y);
        Ok(())
    }

    /// Set a walking entity's velocity.
    pub fn set_velocity(&mut self, entity: Entity, vx: f32, vy: f32) -> Result<(), SimError> {
        let mut vel = self
            .world
            .get_mut::<Velocity>(entity)
            .ok_or(SimError::MissingComponent {
                entity,
                component: "Velocity",
            })?;
        *vel = Velocity::new(vx, vy);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Reachability of a monitored entity.
    pub fn reachability(&self, entity: Entity) -> Option<ReachabilityState> {
        self.world.get::<ReachabilityMonitor>(entity).map(|m| m.state)
    }

    /// Collisions resolved during the last fixed update.
    pub fn collision_events(&self) -> &[CollisionEvent] {
        &self.world.resource::<CollisionEventBuffer>().events
    }

    /// Reachability flips during the last fixed update.
    pub fn reachability_events(&self) -> &[ReachabilityChanged] {
        &self.world.resource::<ReachabilityEventBuffer>().events
    }

    /// Monitors waiting for recomputation.
    pub fn pending_reachability(&mut self) -> usize {
        self.world.resource_mut::<ReachabilityQueue>().len()
    }

    pub fn region_index(&self) -> &RegionIndex {
        self.world.resource::<RegionIndex>()
    }

    pub fn grid(&self) -> &CellGrid {
        self.world.resource::<CellGrid>()
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Capture the persistent state.
    pub fn save_state(&mut self) -> SaveState {
        SaveState::capture(&mut self.world, self.tick, self.time)
    }

    /// Serialize the persistent state to JSON.
    pub fn save(&mut self) -> Result<String, SimError> {
        save_to_json(&self.save_state())
    }

    /// Rebuild a world from a save. Index entries are re-registered and every
    /// monitor starts over as `Pending`.
    pub fn from_save_state(state: SaveState) -> Result<Self, SimError> {
        let mut sim = Self::try_with_config(state.config)?;
        sim.world.insert_resource(state.grid.to_grid()?);
        sim.tick = state.tick;
        sim.time = state.time;
        sim.world.resource_mut::<SimTick>().0 = state.tick;

        for saved in state.structures {
            sim.insert_structure(saved.position, saved.capture)?;
        }
        for saved in state.living {
            let entity = {
                let mut entity = sim.world.spawn((
                    saved.position,
                    saved.velocity,
                    saved.health,
                    TagSet(saved.tags),
                ));
                if let Some(exposure) = saved.exposure {
                    entity.insert(exposure);
                }
                if saved.navigator {
                    entity.insert(Navigator);
                }
                entity.id()
            };
            lifecycle::init_living(&mut sim.world, entity)?;
        }
        for saved in state.radbolts {
            sim.insert_radbolt(saved.position, saved.radbolt)?;
        }
        for saved in state.monitors {
            sim.spawn_monitored(saved.position.x, saved.position.y, saved.offsets)?;
        }

        info!(tick = sim.tick, entities = sim.world.entities().len(), "save loaded");
        Ok(sim)
    }

    /// Parse and rebuild a world from [`SimWorld::save`] output.
    pub fn load(data: &str) -> Result<Self, SimError> {
        Self::from_save_state(save_from_json(data)?)
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
