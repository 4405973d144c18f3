//! Cell grid - solidity and the per-cell structure layer.
//!
//! The grid is the spatial engine everything else consults: world/cell
//! conversion, validity checks, solid queries and per-cell structure lookup.
//! Solidity edits are recorded as dirty cells so the navigation probe can
//! recompute lazily instead of every tick.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::grid_len;
use crate::error::SimError;
use tracing::warn;

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// 4-connected neighbours (no bounds check).
    pub fn neighbours(self) -> [Cell; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }
}

/// Grid of cells with solidity and a structure layer.
#[derive(Resource, Debug, Clone)]
pub struct CellGrid {
    /// Width of the grid in cells.
    pub width: i32,
    /// Height of the grid in cells.
    pub height: i32,
    /// Size of each cell in world units. Cell (0, 0) starts at the world origin.
    pub cell_size: f32,
    /// Solid flags (row-major order).
    solid: Vec<bool>,
    /// Structure occupying each cell (row-major order).
    structures: Vec<Option<Entity>>,
    /// Cells whose solidity changed since the last `take_dirty_cells`.
    dirty: Vec<Cell>,
}

impl CellGrid {
    /// Create an open grid. Dimensions that cannot be allocated produce an
    /// empty grid; use [`CellGrid::try_new`] to get the error instead.
    pub fn new(width: i32, height: i32, cell_size: f32) -> Self {
        Self::try_new(width, height, cell_size).unwrap_or_else(|err| {
            warn!(%err, width, height, "grid dimensions rejected; using an empty grid");
            Self::with_len(0, 0, cell_size, 0)
        })
    }

    /// Create an open grid, rejecting negative or oversized dimensions.
    pub fn try_new(width: i32, height: i32, cell_size: f32) -> Result<Self, SimError> {
        let len = grid_len(width, height).ok_or(SimError::InvalidConfig {
            field: "grid_width/grid_height",
            reason: "grid has too many cells",
        })?;
        Ok(Self::with_len(width, height, cell_size, len))
    }

    fn with_len(width: i32, height: i32, cell_size: f32, len: usize) -> Self {
        Self {
            width,
            height,
            cell_size,
            solid: vec![false; len],
            structures: vec![None; len],
            dirty: Vec::new(),
        }
    }

    fn cell_index(&self, cell: Cell) -> Option<usize> {
        self.is_valid(cell)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    /// Whether the cell lies inside the grid.
    #[inline]
    pub fn is_valid(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Convert world coordinates to a cell. The result may be invalid.
    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> Cell {
        Cell::new(
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// World coordinates of a cell's centre.
    pub fn cell_to_world(&self, cell: Cell) -> (f32, f32) {
        (
            (cell.x as f32 + 0.5) * self.cell_size,
            (cell.y as f32 + 0.5) * self.cell_size,
        )
    }

    /// Invalid cells are never solid.
    pub fn is_solid(&self, cell: Cell) -> bool {
        self.cell_index(cell).is_some_and(|i| self.solid[i])
    }

    /// Whether agents can stand in the cell.
    pub fn is_passable(&self, cell: Cell) -> bool {
        self.cell_index(cell).is_some_and(|i| !self.solid[i])
    }

    /// Set solidity. Records the cell as dirty when the value changes.
    pub fn set_solid(&mut self, cell: Cell, solid: bool) -> Result<(), SimError> {
        let i = self.cell_index(cell).ok_or(SimError::InvalidCell { x: cell.x, y: cell.y })?;
        if self.solid[i] != solid {
            self.solid[i] = solid;
            self.dirty.push(cell);
        }
        Ok(())
    }

    /// Structure occupying the cell, if any.
    pub fn structure_at(&self, cell: Cell) -> Option<Entity> {
        self.cell_index(cell).and_then(|i| self.structures[i])
    }

    /// Place a structure in a cell, replacing whatever was there.
    /// Structures block navigation, so the cell becomes solid.
    pub fn place_structure(&mut self, cell: Cell, entity: Entity) -> Result<(), SimError> {
        let i = self.cell_index(cell).ok_or(SimError::InvalidCell { x: cell.x, y: cell.y })?;
        self.structures[i] = Some(entity);
        self.set_solid(cell, true)
    }

    /// Clear and reopen every cell occupied by `entity`. Returns the cells.
    pub fn clear_structure(&mut self, entity: Entity) -> Vec<Cell> {
        let cells: Vec<Cell> = self
            .structures
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Some(entity))
            .map(|(i, _)| Cell::new(i as i32 % self.width, i as i32 / self.width))
            .collect();
        for &cell in &cells {
            if let Some(i) = self.cell_index(cell) {
                self.structures[i] = None;
            }
            let _ = self.set_solid(cell, false);
        }
        cells
    }

    pub fn has_dirty_cells(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain the cells whose solidity changed.
    pub fn take_dirty_cells(&mut self) -> Vec<Cell> {
        std::mem::take(&mut self.dirty)
    }

    /// World bounds `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            0.0,
            0.0,
            self.width as f32 * self.cell_size,
            self.height as f32 * self.cell_size,
        )
    }
}

impl Default for CellGrid {
    fn default() -> Self {
        Self::new(64, 64, 1.0)
    }
}

/// Serializable form of the grid. Structures are not included; they are
/// re-placed when their entities are restored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: i32,
    pub height: i32,
    pub cell_size: f32,
    /// Solid cells only.
    pub solid: Vec<Cell>,
}

impl GridSnapshot {
    pub fn from_grid(grid: &CellGrid) -> Self {
        let solid = grid
            .solid
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| Cell::new(i as i32 % grid.width, i as i32 / grid.width))
            .collect();
        Self {
            width: grid.width,
            height: grid.height,
            cell_size: grid.cell_size,
            solid,
        }
    }

    /// Rebuild the grid. Restored solid cells are not reported as dirty.
    pub fn to_grid(&self) -> Result<CellGrid, SimError> {
        let mut grid = CellGrid::try_new(self.width, self.height, self.cell_size)?;
        for &cell in &self.solid {
            let i = grid
                .cell_index(cell)
                .ok_or(SimError::InvalidCell { x: cell.x, y: cell.y })?;
            grid.solid[i] = true;
        }
        Ok(grid)
    }
}
