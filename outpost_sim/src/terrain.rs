// Terrain collaborator interface and a dense heightmap implementation.
//
// Procedural terrain generation lives outside this crate. The sim consumes
// terrain only through `TerrainProvider`: per-cell walkability and movement
// penalty (read when the `Grid` is built or a region is rebuilt) and
// surface height (read when path waypoints are lifted back into 3D).
//
// `HeightmapTerrain` is a plain per-cell store that satisfies the trait.
// Tests and the headless runner use it; a real game would implement the
// trait over its own map data.
//
// Terrain edits follow a two-step protocol: mutate the provider, then call
// `Sim::terrain_changed(bounds)` so the grid rebuilds the region and
// notifies observing agents. See `grid.rs` for the rebuild.

use crate::types::{Bounds, CellCoord};
use glam::Vec2;

/// Read-only view of the external map consumed by the pathfinding grid.
pub trait TerrainProvider {
    /// Whether agents can stand on this cell.
    fn walkable(&self, cell: CellCoord) -> bool;

    /// Extra traversal cost for entering this cell (mud, slopes, ...).
    fn movement_penalty(&self, cell: CellCoord) -> u32;

    /// Surface height at a planar (x, z) world position.
    fn height_at(&self, position: Vec2) -> f32;
}

/// Dense per-cell terrain: height, walkability and penalty arrays that
/// share the pathfinding grid's layout (row-major, `y * width + x`).
#[derive(Clone, Debug)]
pub struct HeightmapTerrain {
    width: u32,
    height: u32,
    cell_size: f32,
    origin: Vec2,
    heights: Vec<f32>,
    walkable: Vec<bool>,
    penalties: Vec<u32>,
}

impl HeightmapTerrain {
    /// Flat, fully walkable, zero-penalty terrain.
    pub fn flat(width: u32, height: u32, cell_size: f32, origin: Vec2) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            cell_size,
            origin,
            heights: vec![0.0; n],
            walkable: vec![true; n],
            penalties: vec![0; n],
        }
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.x < 0 || cell.y < 0 || cell.x as u32 >= self.width || cell.y as u32 >= self.height {
            return None;
        }
        Some(cell.y as usize * self.width as usize + cell.x as usize)
    }

    /// No-op for out-of-bounds cells.
    pub fn set_walkable(&mut self, cell: CellCoord, walkable: bool) {
        if let Some(i) = self.index(cell) {
            self.walkable[i] = walkable;
        }
    }

    pub fn set_penalty(&mut self, cell: CellCoord, penalty: u32) {
        if let Some(i) = self.index(cell) {
            self.penalties[i] = penalty;
        }
    }

    pub fn set_height(&mut self, cell: CellCoord, height: f32) {
        if let Some(i) = self.index(cell) {
            self.heights[i] = height;
        }
    }

    /// Mark every cell in `bounds` walkable or not.
    pub fn fill_walkable(&mut self, bounds: Bounds, walkable: bool) {
        for cell in bounds.cells() {
            self.set_walkable(cell, walkable);
        }
    }

    /// Level a region to one height (the "flatten path" terrain edit).
    pub fn flatten(&mut self, bounds: Bounds, height: f32) {
        for cell in bounds.cells() {
            self.set_height(cell, height);
        }
    }

    fn cell_at(&self, position: Vec2) -> CellCoord {
        let local = (position - self.origin) / self.cell_size;
        CellCoord::new(
            (local.x.floor() as i32).clamp(0, self.width as i32 - 1),
            (local.y.floor() as i32).clamp(0, self.height as i32 - 1),
        )
    }
}

impl TerrainProvider for HeightmapTerrain {
    fn walkable(&self, cell: CellCoord) -> bool {
        self.index(cell).is_some_and(|i| self.walkable[i])
    }

    fn movement_penalty(&self, cell: CellCoord) -> u32 {
        self.index(cell).map_or(0, |i| self.penalties[i])
    }

    fn height_at(&self, position: Vec2) -> f32 {
        self.index(self.cell_at(position))
            .map_or(0.0, |i| self.heights[i])
    }
}
