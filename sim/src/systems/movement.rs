//! Movement system - applies velocity to walking entities.
//!
//! Radbolts move inside the collision checker, which needs the before and
//! after cell of every step.

use crate::components::*;
use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Global simulation tick counter. Increments each fixed update.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// System that applies velocity to position.
pub fn movement_system(
    dt: Res<DeltaTime>,
    mut query: Query<(&mut Position, &Velocity), (Without<Radbolt>, Without<PendingRemoval>)>,
) {
    let delta = dt.0;
    for (mut pos, vel) in query.iter_mut() {
        if vel.vx == 0.0 && vel.vy == 0.0 {
            continue;
        }
        pos.x += vel.vx * delta;
        pos.y += vel.vy * delta;
    }
}
