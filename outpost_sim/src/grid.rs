// 2D pathfinding grid.
//
// The grid discretizes the horizontal plane into square cells. Each cell
// stores walkability and a movement penalty, in flat `Vec`s indexed by
// `y * width + x` for O(1) access. Out-of-bounds world queries clamp to
// the nearest edge cell rather than failing.
//
// Penalties keep two layers: the raw per-cell penalty read from the
// terrain (plus `obstacle_proximity_penalty` on unwalkable cells), and the
// box-blurred layer that A* actually reads. Blurring always starts from the
// raw layer, so rebuilding a region never blurs already-blurred data. The
// blur is two separable running-sum passes, O(width * height) regardless of
// radius. Edge cells replicate outward (indices clamp).
//
// The grid is also the terrain-change publisher: agents register as
// observers by id, and `rebuild_region()` returns the observer list only
// after every cell has been recomputed and re-blurred.
//
// See also: `terrain.rs` for the `TerrainProvider` the grid is built from,
// `pathfinding.rs` for A* over this grid, `sim.rs` which owns it.
//
// **Critical constraint: determinism.** Observers live in a `BTreeSet`, so
// notification order is stable.

use crate::config::GridConfig;
use crate::terrain::TerrainProvider;
use crate::types::{AgentId, Bounds, CellCoord};
use glam::{Vec2, Vec3};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// A snapshot of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub coord: CellCoord,
    pub walkable: bool,
    pub movement_penalty: u32,
}

/// Result of a regional rebuild: what changed and who must hear about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainChange {
    /// The rebuilt region, clamped to the grid.
    pub bounds: Bounds,
    /// Observers registered at rebuild time, in id order.
    pub observers: Vec<AgentId>,
}

#[derive(Clone, Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cell_size: f32,
    origin: Vec2,
    walkable: Vec<bool>,
    raw_penalty: Vec<u32>,
    penalty: Vec<u32>,
    blur_radius: u32,
    obstacle_penalty: u32,
    observers: BTreeSet<AgentId>,
}

impl Grid {
    /// Build the grid from terrain and smooth its penalty field.
    pub fn build(config: &GridConfig, terrain: &impl TerrainProvider) -> Self {
        let width = config.width.max(1) as i32;
        let height = config.height.max(1) as i32;
        let n = width as usize * height as usize;
        let mut grid = Self {
            width,
            height,
            cell_size: config.cell_size,
            origin: Vec2::from(config.origin),
            walkable: vec![true; n],
            raw_penalty: vec![0; n],
            penalty: vec![0; n],
            blur_radius: config.blur_radius,
            obstacle_penalty: config.obstacle_proximity_penalty,
            observers: BTreeSet::new(),
        };
        let all = grid.bounds();
        grid.sample_region(all, terrain);
        grid.apply_penalty_blur(config.blur_radius);
        grid
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Total number of cells; the upper bound on any search's open set.
    pub fn len(&self) -> usize {
        self.walkable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walkable.is_empty()
    }

    /// The whole grid as a bounds rectangle.
    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            CellCoord::new(0, 0),
            CellCoord::new(self.width - 1, self.height - 1),
        )
    }

    pub fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Flat index of a cell. `None` if out of bounds.
    pub fn index_of(&self, cell: CellCoord) -> Option<usize> {
        if self.in_bounds(cell) {
            Some(cell.y as usize * self.width as usize + cell.x as usize)
        } else {
            None
        }
    }

    /// Inverse of `index_of`. The index must be in range.
    pub fn coord_of(&self, index: usize) -> CellCoord {
        let w = self.width as usize;
        CellCoord::new((index % w) as i32, (index / w) as i32)
    }

    /// Clamp any coordinate into the grid.
    pub fn clamp(&self, cell: CellCoord) -> CellCoord {
        CellCoord::new(
            cell.x.clamp(0, self.width - 1),
            cell.y.clamp(0, self.height - 1),
        )
    }

    /// Cell containing a world position, clamped to the nearest valid cell.
    pub fn coord_at(&self, position: Vec3) -> CellCoord {
        let local = (Vec2::new(position.x, position.z) - self.origin) / self.cell_size;
        self.clamp(CellCoord::new(local.x.floor() as i32, local.y.floor() as i32))
    }

    /// Cell snapshot at a world position (clamped, never fails).
    pub fn cell_at(&self, position: Vec3) -> Cell {
        self.cell(self.coord_at(position))
    }

    /// Cell snapshot at a coordinate (clamped, never fails).
    pub fn cell(&self, coord: CellCoord) -> Cell {
        let coord = self.clamp(coord);
        let i = coord.y as usize * self.width as usize + coord.x as usize;
        Cell {
            coord,
            walkable: self.walkable[i],
            movement_penalty: self.penalty[i],
        }
    }

    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.index_of(cell).is_some_and(|i| self.walkable[i])
    }

    /// Blurred penalty of a cell (0 off-grid).
    pub fn movement_penalty(&self, cell: CellCoord) -> u32 {
        self.index_of(cell).map_or(0, |i| self.penalty[i])
    }

    /// Penalty by flat index, for the search hot loop.
    pub(crate) fn penalty_at(&self, index: usize) -> u32 {
        self.penalty[index]
    }

    pub(crate) fn walkable_at(&self, index: usize) -> bool {
        self.walkable[index]
    }

    /// Planar center of a cell in world space.
    pub fn cell_center(&self, cell: CellCoord) -> Vec2 {
        self.origin
            + Vec2::new(
                (cell.x as f32 + 0.5) * self.cell_size,
                (cell.y as f32 + 0.5) * self.cell_size,
            )
    }

    /// World-space center of a cell with the terrain's surface height.
    pub fn world_position(&self, cell: CellCoord, terrain: &impl TerrainProvider) -> Vec3 {
        let c = self.cell_center(cell);
        Vec3::new(c.x, terrain.height_at(c), c.y)
    }

    /// Up to 8 surrounding cells, excluding off-grid ones. Walkability is
    /// not filtered here; the search decides.
    pub fn neighbors(&self, cell: CellCoord) -> SmallVec<[CellCoord; 8]> {
        let mut out = SmallVec::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = CellCoord::new(cell.x + dx, cell.y + dy);
                if self.in_bounds(n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Replace every cell's penalty with the rounded mean of the
    /// `(2r+1)^2` box of raw penalties around it.
    pub fn apply_penalty_blur(&mut self, radius: u32) {
        self.blur_radius = radius;
        if radius == 0 {
            self.penalty.clone_from(&self.raw_penalty);
            return;
        }
        let w = self.width as usize;
        let h = self.height as usize;
        let r = radius as i64;
        let kernel = (2 * radius as u64 + 1).pow(2);

        // Horizontal pass: sums over [x - r, x + r] per row.
        let mut horizontal = vec![0u64; w * h];
        for y in 0..h {
            let row = y * w;
            let at = |x: i64| self.raw_penalty[row + x.clamp(0, w as i64 - 1) as usize] as u64;
            let mut sum: u64 = (-r..=r).map(at).sum();
            horizontal[row] = sum;
            for x in 1..w as i64 {
                sum = sum + at(x + r) - at(x - r - 1);
                horizontal[row + x as usize] = sum;
            }
        }

        // Vertical pass over the horizontal sums.
        for x in 0..w {
            let at = |y: i64| horizontal[y.clamp(0, h as i64 - 1) as usize * w + x];
            let mut sum: u64 = (-r..=r).map(at).sum();
            self.penalty[x] = ((sum + kernel / 2) / kernel) as u32;
            for y in 1..h as i64 {
                sum = sum + at(y + r) - at(y - r - 1);
                self.penalty[y as usize * w + x] = ((sum + kernel / 2) / kernel) as u32;
            }
        }
    }

    /// Recompute walkability and penalties for an edited region, re-blur,
    /// and report which observers must be notified. The grid is fully
    /// consistent before this returns.
    pub fn rebuild_region(
        &mut self,
        bounds: Bounds,
        terrain: &impl TerrainProvider,
    ) -> TerrainChange {
        let bounds = Bounds::new(self.clamp(bounds.min), self.clamp(bounds.max));
        self.sample_region(bounds, terrain);
        self.apply_penalty_blur(self.blur_radius);
        log::info!(
            "grid rebuilt region {}..{} ({} observers)",
            bounds.min,
            bounds.max,
            self.observers.len()
        );
        TerrainChange {
            bounds,
            observers: self.observers.iter().copied().collect(),
        }
    }

    pub fn add_terrain_observer(&mut self, agent: AgentId) {
        self.observers.insert(agent);
    }

    pub fn remove_terrain_observer(&mut self, agent: AgentId) {
        self.observers.remove(&agent);
    }

    pub fn terrain_observers(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.observers.iter().copied()
    }

    fn sample_region(&mut self, bounds: Bounds, terrain: &impl TerrainProvider) {
        for cell in bounds.cells() {
            let Some(i) = self.index_of(cell) else {
                continue;
            };
            let walkable = terrain.walkable(cell);
            let mut penalty = terrain.movement_penalty(cell);
            if !walkable {
                penalty = penalty.saturating_add(self.obstacle_penalty);
            }
            self.walkable[i] = walkable;
            self.raw_penalty[i] = penalty;
        }
    }
}
