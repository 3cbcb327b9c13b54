// Path simplification and path following.
//
// A raw A* result is a chain of adjacent cells. `simplify_path()` keeps the
// start cell, every cell where the step direction changes, and the final
// cell, then lifts each kept cell back into 3D using the terrain height
// (grid cells are 2D).
//
// `Path` turns waypoints into steering data: a `TurnBoundary` line before
// each waypoint (offset back along the approach direction by the turn
// distance, so the agent begins its turn early), a zero-offset finish line
// on the last waypoint, and a slow-down index at which braking starts.
//
// `PathFollower` is the per-tick movement state machine. Each `advance()`
// moves the agent one tick: it steps the boundary index past every line the
// agent has crossed, brakes inside the slow-down zone, turns the heading
// toward the current look point and moves forward. It reports `Arrived`
// exactly once, when the finish line is crossed.
//
// See also: `pathfinding.rs` for the cell chains fed in here, `agent.rs`
// which owns a follower while navigating.

use crate::grid::Grid;
use crate::terrain::TerrainProvider;
use crate::types::{CellCoord, flat};
use glam::{Vec2, Vec3};

/// Minimum fraction of full speed inside the braking zone.
const MIN_SPEED_FRACTION: f32 = 0.15;

/// Reduce a cell chain to direction-change waypoints in world space.
pub fn simplify_path(
    cells: &[CellCoord],
    grid: &Grid,
    terrain: &impl TerrainProvider,
) -> Vec<Vec3> {
    simplify_cells(cells)
        .into_iter()
        .map(|cell| grid.world_position(cell, terrain))
        .collect()
}

/// The cell-level half of `simplify_path`.
pub fn simplify_cells(cells: &[CellCoord]) -> Vec<CellCoord> {
    let Some((&first, rest)) = cells.split_first() else {
        return Vec::new();
    };
    let mut kept = vec![first];
    if rest.is_empty() {
        return kept;
    }
    for i in 1..cells.len() - 1 {
        let incoming = direction(cells[i - 1], cells[i]);
        let outgoing = direction(cells[i], cells[i + 1]);
        if incoming != outgoing {
            kept.push(cells[i]);
        }
    }
    kept.push(cells[cells.len() - 1]);
    kept
}

fn direction(from: CellCoord, to: CellCoord) -> (i32, i32) {
    (to.x - from.x, to.y - from.y)
}

/// A line on the ground plane that the agent crosses while travelling
/// along `direction`. Signed distance is negative on the approach side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnBoundary {
    pub point: Vec2,
    /// Unit approach direction. Zero for degenerate (zero-length) legs,
    /// which count as already crossed.
    pub direction: Vec2,
}

impl TurnBoundary {
    pub fn signed_distance(&self, position: Vec2) -> f32 {
        (position - self.point).dot(self.direction)
    }

    pub fn has_crossed(&self, position: Vec2) -> bool {
        self.signed_distance(position) >= 0.0
    }

    pub fn distance_from(&self, position: Vec2) -> f32 {
        self.signed_distance(position).abs()
    }
}

/// Steering data for one movement leg. Replaced wholesale on every new
/// path result, never edited.
#[derive(Clone, Debug)]
pub struct Path {
    pub look_points: Vec<Vec3>,
    pub turn_boundaries: Vec<TurnBoundary>,
    pub finish_line_index: usize,
    pub slow_down_index: usize,
    pub stopping_distance: f32,
}

impl Path {
    /// Build steering data for `waypoints`, starting from `start`.
    /// `waypoints` must not be empty.
    pub fn new(
        waypoints: Vec<Vec3>,
        start: Vec3,
        turn_distance: f32,
        stopping_distance: f32,
    ) -> Self {
        let finish_line_index = waypoints.len().saturating_sub(1);
        let mut turn_boundaries = Vec::with_capacity(waypoints.len());
        let mut previous = flat(start);

        for (i, waypoint) in waypoints.iter().enumerate() {
            let current = flat(*waypoint);
            let direction = (current - previous).normalize_or_zero();
            let point = if i == finish_line_index {
                current
            } else {
                current - direction * turn_distance
            };
            turn_boundaries.push(TurnBoundary { point, direction });
            previous = point;
        }

        // Walk back from the end until the remaining length exceeds the
        // stopping distance; braking starts at that leg.
        let mut slow_down_index = 0;
        let mut distance_from_end = 0.0;
        for i in (1..waypoints.len()).rev() {
            distance_from_end += flat(waypoints[i]).distance(flat(waypoints[i - 1]));
            if distance_from_end > stopping_distance {
                slow_down_index = i;
                break;
            }
        }

        Self {
            look_points: waypoints,
            turn_boundaries,
            finish_line_index,
            slow_down_index,
            stopping_distance,
        }
    }
}

/// Per-tick outcome of `PathFollower::advance`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowStatus {
    Moving,
    Arrived,
}

/// Movement parameters for one tick.
#[derive(Clone, Copy, Debug)]
pub struct Steering {
    pub move_speed: f32,
    pub turn_speed: f32,
}

/// Drives an agent along a `Path`, one tick per `advance`.
#[derive(Clone, Debug)]
pub struct PathFollower {
    path: Path,
    /// Cells of the raw search result, kept for terrain-change checks.
    cells: Vec<CellCoord>,
    index: usize,
    speed_fraction: f32,
    arrived: bool,
}

impl PathFollower {
    pub fn new(path: Path, cells: Vec<CellCoord>) -> Self {
        Self {
            path,
            cells,
            index: 0,
            speed_fraction: 1.0,
            arrived: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cells(&self) -> &[CellCoord] {
        &self.cells
    }

    pub fn speed_fraction(&self) -> f32 {
        self.speed_fraction
    }

    /// Move `position` (and turn `heading`) for one tick of `dt` seconds.
    pub fn advance(
        &mut self,
        position: &mut Vec3,
        heading: &mut Vec2,
        steering: Steering,
        dt: f32,
    ) -> FollowStatus {
        if self.arrived || self.path.turn_boundaries.is_empty() {
            self.arrived = true;
            return FollowStatus::Arrived;
        }

        let position_2d = flat(*position);
        while self.path.turn_boundaries[self.index].has_crossed(position_2d) {
            if self.index == self.path.finish_line_index {
                self.arrived = true;
                return FollowStatus::Arrived;
            }
            self.index += 1;
        }

        if self.index >= self.path.slow_down_index && self.path.stopping_distance > 0.0 {
            let finish = self.path.turn_boundaries[self.path.finish_line_index];
            self.speed_fraction = (finish.distance_from(position_2d) / self.path.stopping_distance)
                .clamp(MIN_SPEED_FRACTION, 1.0);
        }

        let look_point = self.path.look_points[self.index];
        let desired = (flat(look_point) - position_2d).normalize_or_zero();
        if desired != Vec2::ZERO {
            let blend = (dt * steering.turn_speed).clamp(0.0, 1.0);
            let turned = heading.lerp(desired, blend).normalize_or_zero();
            *heading = if turned == Vec2::ZERO { desired } else { turned };
        }

        let step = *heading * steering.move_speed * self.speed_fraction * dt;
        position.x += step.x;
        position.z += step.y;
        let blend = (dt * steering.turn_speed).clamp(0.0, 1.0);
        position.y += (look_point.y - position.y) * blend;

        FollowStatus::Moving
    }
}
