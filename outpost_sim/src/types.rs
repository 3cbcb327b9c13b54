// Core types shared across the simulation.
//
// Defines grid coordinates (`CellCoord`), the inclusive cell rectangle used
// for terrain edits (`Bounds`), strongly-typed entity identifiers, and the
// small enums that describe work (`ActionKind`, `ResourceKind`,
// `TaskCategory`). World-space positions use `glam::Vec3` with x/z as the
// horizontal plane and y as height; the planar projection is `flat()`.
//
// **Critical constraint: determinism.** Entity IDs are plain monotonic
// integers handed out by their owning registry. They order totally, so every
// `BTreeMap` keyed by them iterates identically on every run.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A cell position in the 2D pathfinding grid.
///
/// `x` runs along world +X, `y` along world +Z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Octile distance under the 10/14 step model: 14 per diagonal step,
    /// 10 per straight step. Exact cost of the cheapest unobstructed walk.
    pub fn diagonal_distance(self, other: Self) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        if dx > dy {
            14 * dy + 10 * (dx - dy)
        } else {
            14 * dx + 10 * (dy - dx)
        }
    }

    /// Chebyshev distance (number of 8-connected steps).
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive rectangle of cells, used to describe terrain edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl Bounds {
    /// Build from two corners in any order.
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            min: CellCoord::new(a.x.min(b.x), a.y.min(b.y)),
            max: CellCoord::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn single(cell: CellCoord) -> Self {
        Self {
            min: cell,
            max: cell,
        }
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        cell.x >= self.min.x && cell.x <= self.max.x && cell.y >= self.min.y && cell.y <= self.max.y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Iterate every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| CellCoord::new(x, y)))
    }
}

/// Project a world position onto the horizontal plane.
pub fn flat(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

// ---------------------------------------------------------------------------
// Entity IDs: monotonic integers
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Identifier of a composite task. Assigned in creation order.
TaskId);
entity_id!(/// Identifier of an autonomous agent.
AgentId);
entity_id!(/// Identifier of an external object that agents perform actions on.
ActionableId);

/// Identity of one leaf task: its owning composite task plus its position
/// in that task's leaf list. Clones get a fresh `TaskId`, so their leaves
/// never alias the template's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafRef {
    pub task: TaskId,
    pub index: usize,
}

impl fmt::Display for LeafRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.task, self.index)
    }
}

// ---------------------------------------------------------------------------
// Work enums
// ---------------------------------------------------------------------------

/// The action an agent performs once it reaches a leaf task's target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Build,
    Mine,
    PickUp,
    DropOff,
    FlattenPath,
}

/// Resources a leaf task can target without a concrete position
/// ("go mine the nearest ore").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Ore,
    Silver,
    Gold,
}

/// Coarse category of a composite task, used for display and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCategory {
    Mine,
    Build,
    Move,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_distance_matches_step_model() {
        let a = CellCoord::new(0, 0);
        assert_eq!(a.diagonal_distance(CellCoord::new(9, 9)), 126);
        assert_eq!(a.diagonal_distance(CellCoord::new(5, 0)), 50);
        assert_eq!(a.diagonal_distance(CellCoord::new(3, 7)), 3 * 14 + 4 * 10);
        assert_eq!(
            CellCoord::new(3, 7).diagonal_distance(a),
            a.diagonal_distance(CellCoord::new(3, 7))
        );
    }

    #[test]
    fn bounds_normalizes_corners() {
        let b = Bounds::new(CellCoord::new(5, 1), CellCoord::new(2, 4));
        assert_eq!(b.min, CellCoord::new(2, 1));
        assert_eq!(b.max, CellCoord::new(5, 4));
        assert!(b.contains(CellCoord::new(2, 4)));
        assert!(!b.contains(CellCoord::new(6, 4)));
        assert_eq!(b.cells().count(), 16);
    }

    #[test]
    fn bounds_intersection() {
        let a = Bounds::new(CellCoord::new(0, 0), CellCoord::new(3, 3));
        let b = Bounds::new(CellCoord::new(3, 3), CellCoord::new(6, 6));
        let c = Bounds::new(CellCoord::new(4, 0), CellCoord::new(6, 2));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn task_ids_order_by_creation() {
        assert!(TaskId(1) < TaskId(2));
        assert_eq!(TaskId(7).to_string(), "TaskId(7)");
    }
}
