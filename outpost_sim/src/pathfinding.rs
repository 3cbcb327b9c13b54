// A* pathfinding over the grid.
//
// Standard A* with an indexable min-heap as the open set, keyed by
// `(f_cost, h_cost, cell)`. Per-search node state (g/h costs and the
// predecessor) lives in a `Vec<SearchNode>` arena indexed by flat cell
// index; predecessors are arena indices, not pointers. The arena belongs to
// one `AStarSearch` and is dropped with it, so nothing survives between
// searches.
//
// Costs use the 10/14 fixed-point step model: entering a neighbor costs 10
// for a straight step or 14 for a diagonal one, plus the neighbor's
// (blurred) movement penalty. The heuristic is the octile distance under the
// same model, which never overestimates since penalties are non-negative.
//
// A search is resumable: `advance()` expands at most `budget` nodes and
// reports `Pending` if it ran out, so the request manager can spread a long
// search over several ticks. `find_path()` runs one to completion.
//
// See also: `grid.rs` for the searched grid, `heap.rs` for the open set,
// `request.rs` which drives searches per tick.
//
// **Critical constraint: determinism.** The open set orders ties by h-cost
// then by cell index, so equal-cost paths resolve identically every run.

use crate::grid::Grid;
use crate::heap::{HeapItem, IndexedHeap};
use crate::types::CellCoord;
use std::cmp::Ordering;

const STRAIGHT_STEP: u32 = 10;
const DIAGONAL_STEP: u32 = 14;

/// The result of a finished search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSearchResult {
    /// Cells from start to goal inclusive. Empty when `found` is false.
    pub cells: Vec<CellCoord>,
    pub found: bool,
    /// Total g-cost of the path (steps plus entered-cell penalties).
    pub cost: u32,
    /// Nodes popped from the open set.
    pub expansions: usize,
}

impl PathSearchResult {
    fn not_found(expansions: usize) -> Self {
        Self {
            cells: Vec::new(),
            found: false,
            cost: 0,
            expansions,
        }
    }
}

/// Progress of a resumable search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchStatus {
    /// Budget exhausted; call `advance` again.
    Pending,
    Done(PathSearchResult),
}

/// Per-search node state.
#[derive(Clone, Copy, Debug)]
struct SearchNode {
    g_cost: u32,
    h_cost: u32,
    parent: Option<usize>,
    closed: bool,
}

impl SearchNode {
    const FRESH: Self = Self {
        g_cost: u32::MAX,
        h_cost: 0,
        parent: None,
        closed: false,
    };
}

/// Open-set entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenNode {
    cell: usize,
    f_cost: u32,
    h_cost: u32,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            .then_with(|| self.h_cost.cmp(&other.h_cost))
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl HeapItem for OpenNode {
    type Key = usize;

    fn heap_key(&self) -> usize {
        self.cell
    }
}

/// One in-flight A* search between two cells.
#[derive(Clone, Debug)]
pub struct AStarSearch {
    start: CellCoord,
    goal: CellCoord,
    goal_index: usize,
    nodes: Vec<SearchNode>,
    open: IndexedHeap<OpenNode>,
    expansions: usize,
    done: Option<PathSearchResult>,
}

impl AStarSearch {
    /// Prepare a search. Endpoints are clamped into the grid. An
    /// unwalkable goal finishes immediately as not found.
    pub fn new(grid: &Grid, start: CellCoord, goal: CellCoord) -> Self {
        let start = grid.clamp(start);
        let goal = grid.clamp(goal);
        let mut search = Self {
            start,
            goal,
            goal_index: 0,
            nodes: Vec::new(),
            open: IndexedHeap::new(),
            expansions: 0,
            done: None,
        };
        search.reset(grid);
        search
    }

    pub fn start(&self) -> CellCoord {
        self.start
    }

    pub fn goal(&self) -> CellCoord {
        self.goal
    }

    /// Discard all progress and start over against the grid's current
    /// contents (used after a terrain rebuild).
    pub fn reset(&mut self, grid: &Grid) {
        self.nodes.clear();
        self.nodes.resize(grid.len(), SearchNode::FRESH);
        self.open.clear();
        self.expansions = 0;
        self.done = None;

        let (Some(si), Some(gi)) = (grid.index_of(self.start), grid.index_of(self.goal)) else {
            self.done = Some(PathSearchResult::not_found(0));
            return;
        };
        self.goal_index = gi;

        if si == gi {
            self.done = Some(PathSearchResult {
                cells: vec![self.start],
                found: true,
                cost: 0,
                expansions: 0,
            });
            return;
        }
        if !grid.walkable_at(gi) {
            self.done = Some(PathSearchResult::not_found(0));
            return;
        }

        let h = self.start.diagonal_distance(self.goal);
        self.nodes[si] = SearchNode {
            g_cost: 0,
            h_cost: h,
            parent: None,
            closed: false,
        };
        self.open.insert(OpenNode {
            cell: si,
            f_cost: h,
            h_cost: h,
        });
    }

    /// Expand up to `budget` nodes.
    pub fn advance(&mut self, grid: &Grid, budget: usize) -> SearchStatus {
        if let Some(done) = &self.done {
            return SearchStatus::Done(done.clone());
        }

        let mut spent = 0;
        while spent < budget {
            let Ok(current) = self.open.pop_min() else {
                log::trace!(
                    "search {} -> {} exhausted after {} expansions",
                    self.start,
                    self.goal,
                    self.expansions
                );
                let result = PathSearchResult::not_found(self.expansions);
                self.done = Some(result.clone());
                return SearchStatus::Done(result);
            };
            spent += 1;
            self.expansions += 1;

            let ci = current.cell;
            self.nodes[ci].closed = true;

            if ci == self.goal_index {
                let result = self.retrace(grid);
                log::trace!(
                    "search {} -> {} found cost {} in {} expansions",
                    self.start,
                    self.goal,
                    result.cost,
                    self.expansions
                );
                self.done = Some(result.clone());
                return SearchStatus::Done(result);
            }

            let current_coord = grid.coord_of(ci);
            let current_g = self.nodes[ci].g_cost;

            for neighbor in grid.neighbors(current_coord) {
                let Some(ni) = grid.index_of(neighbor) else {
                    continue;
                };
                if !grid.walkable_at(ni) || self.nodes[ni].closed {
                    continue;
                }

                let step = if neighbor.x != current_coord.x && neighbor.y != current_coord.y {
                    DIAGONAL_STEP
                } else {
                    STRAIGHT_STEP
                };
                let tentative_g = current_g
                    .saturating_add(step)
                    .saturating_add(grid.penalty_at(ni));

                let in_open = self.open.contains(&ni);
                if in_open && tentative_g >= self.nodes[ni].g_cost {
                    continue;
                }

                let node = &mut self.nodes[ni];
                if !in_open {
                    node.h_cost = neighbor.diagonal_distance(self.goal);
                }
                node.g_cost = tentative_g;
                node.parent = Some(ci);
                let entry = OpenNode {
                    cell: ni,
                    f_cost: tentative_g.saturating_add(node.h_cost),
                    h_cost: node.h_cost,
                };
                if in_open {
                    self.open.update(entry);
                } else {
                    self.open.insert(entry);
                }
            }
        }
        SearchStatus::Pending
    }

    /// Walk predecessor indices back from the goal.
    fn retrace(&self, grid: &Grid) -> PathSearchResult {
        let mut cells = Vec::new();
        let mut current = Some(self.goal_index);
        while let Some(i) = current {
            cells.push(grid.coord_of(i));
            current = self.nodes[i].parent;
        }
        cells.reverse();
        PathSearchResult {
            cells,
            found: true,
            cost: self.nodes[self.goal_index].g_cost,
            expansions: self.expansions,
        }
    }
}

/// Run a complete search from `start` to `goal`.
pub fn find_path(grid: &Grid, start: CellCoord, goal: CellCoord) -> PathSearchResult {
    let mut search = AStarSearch::new(grid, start, goal);
    loop {
        if let SearchStatus::Done(result) = search.advance(grid, usize::MAX) {
            return result;
        }
    }
}

/// Sum of step costs plus entered-cell penalties along a cell chain.
pub fn path_cost(grid: &Grid, cells: &[CellCoord]) -> u32 {
    cells
        .windows(2)
        .map(|w| w[0].diagonal_distance(w[1]) + grid.movement_penalty(w[1]))
        .sum()
}
