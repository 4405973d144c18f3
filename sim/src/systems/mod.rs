//! ECS Systems for the Gridwatch simulation.
//!
//! Systems contain the logic that operates on components.
//!
//! ## Tick Order
//!
//! Everything runs as one chained group; later systems read what earlier
//! ones wrote, and commands are applied between them.
//!
//! 1. `movement_system` - applies velocity to walking entities
//! 2. `occupancy_system` - moves living entries in the region index
//! 3. `nav_probe_system` - refreshes reachable cells, reports flips
//! 4. `reachability_watch_system` - follows moving monitors
//! 5. `reachability_update_system` - recomputes queued monitors (budgeted)
//! 6. `radbolt_system` - moves radbolts and resolves collisions
//! 7. `cleanup_system` - releases and despawns everything marked for removal

pub mod cleanup;
pub mod movement;
pub mod navigation;
pub mod occupancy;
pub mod radbolt;
pub mod reachability;
pub mod serialization;

pub use cleanup::*;
pub use movement::*;
pub use navigation::*;
pub use occupancy::*;
pub use radbolt::*;
pub use reachability::*;
pub use serialization::*;
