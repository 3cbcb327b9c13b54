// Path requests: one resumable A* search per agent, advanced every tick.
//
// Agents never call the search engine directly. They submit a request
// (start position, leaf, target) and later receive a `PathResponse`. The
// manager keeps at most one in-flight search per agent: a new request from
// the same agent replaces the old one outright and bumps that agent's
// generation counter. Responses carry the generation they were issued
// under, so an agent can drop a response that arrives for a superseded
// request.
//
// Per tick, `advance` spends up to `expansions_per_tick` node expansions
// on every in-flight search. Searches only read the grid, so they run in
// parallel (rayon); results are then sorted by agent id before anything
// observes them. A terrain rebuild calls `restart_all`, which resets every
// in-flight search against the rebuilt grid.
//
// Unknown targets (`TaskTarget::Nearest`) are resolved to the nearest
// actionable providing the resource at request time. No provider, or an
// unwalkable goal cell, produces a failure response on the next advance.
//
// See also: `pathfinding.rs` for `AStarSearch`, `path.rs` for the
// simplification applied to found paths, `sim.rs` which routes responses
// back to agents.

use crate::actionable::ActionableRegistry;
use crate::grid::Grid;
use crate::path::simplify_path;
use crate::pathfinding::{AStarSearch, PathSearchResult, SearchStatus};
use crate::task::TaskTarget;
use crate::terrain::TerrainProvider;
use crate::types::{ActionableId, AgentId, CellCoord, LeafRef};
use glam::Vec3;
use log::{debug, trace};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Delivered to the requesting agent once a search completes.
#[derive(Clone, Debug, PartialEq)]
pub struct PathResponse {
    pub agent: AgentId,
    pub generation: u64,
    pub leaf: LeafRef,
    /// Simplified waypoints in world space. Empty on failure.
    pub waypoints: Vec<Vec3>,
    /// Raw cells of the found path. Empty on failure.
    pub cells: Vec<CellCoord>,
    /// The actionable the target resolved to, if any.
    pub actionable: Option<ActionableId>,
    pub success: bool,
    pub cost: u32,
}

/// What an agent asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathRequest {
    pub agent: AgentId,
    pub from: Vec3,
    pub leaf: LeafRef,
    pub target: TaskTarget,
    /// The leaf's preset target object, if it has one.
    pub actionable: Option<ActionableId>,
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    leaf: LeafRef,
    actionable: Option<ActionableId>,
    /// `None` when the request failed before a search could start.
    search: Option<AStarSearch>,
}

#[derive(Debug)]
pub struct PathRequestManager {
    in_flight: BTreeMap<AgentId, InFlight>,
    generations: BTreeMap<AgentId, u64>,
    expansions_per_tick: usize,
}

impl PathRequestManager {
    pub fn new(expansions_per_tick: usize) -> Self {
        Self {
            in_flight: BTreeMap::new(),
            generations: BTreeMap::new(),
            expansions_per_tick: expansions_per_tick.max(1),
        }
    }

    /// The agent's latest issued generation (0 before any request).
    pub fn generation(&self, agent: AgentId) -> u64 {
        self.generations.get(&agent).copied().unwrap_or(0)
    }

    pub fn is_pending(&self, agent: AgentId) -> bool {
        self.in_flight.contains_key(&agent)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn bump(&mut self, agent: AgentId) -> u64 {
        let g = self.generations.entry(agent).or_insert(0);
        *g += 1;
        *g
    }

    /// Start a search, replacing any search the agent already has in
    /// flight. Returns the request's generation.
    pub fn request(
        &mut self,
        request: PathRequest,
        grid: &Grid,
        actionables: &ActionableRegistry,
    ) -> u64 {
        let PathRequest {
            agent,
            from,
            leaf,
            target,
            actionable,
        } = request;
        let generation = self.bump(agent);
        let resolved = match target {
            TaskTarget::Position(p) => Some((p, actionable)),
            TaskTarget::Nearest(resource) => {
                let nearest = actionables.nearest_providing(resource, from);
                if nearest.is_none() {
                    debug!("{agent}: no actionable provides {resource:?}");
                }
                nearest.map(|(id, p)| (p, Some(id)))
            }
        };

        let (search, actionable) = match resolved {
            Some((goal, actionable)) => {
                let search = AStarSearch::new(grid, grid.coord_at(from), grid.coord_at(goal));
                (Some(search), actionable)
            }
            None => (None, None),
        };
        if self
            .in_flight
            .insert(
                agent,
                InFlight {
                    generation,
                    leaf,
                    actionable,
                    search,
                },
            )
            .is_some()
        {
            trace!("{agent}: superseded previous path request");
        }
        generation
    }

    /// Drop the agent's in-flight search. Any response it would have
    /// produced is never delivered.
    pub fn cancel(&mut self, agent: AgentId) -> bool {
        let removed = self.in_flight.remove(&agent).is_some();
        if removed {
            self.bump(agent);
        }
        removed
    }

    /// Reset every in-flight search against the current grid.
    pub fn restart_all(&mut self, grid: &Grid) {
        for flight in self.in_flight.values_mut() {
            if let Some(search) = flight.search.as_mut() {
                search.reset(grid);
            }
        }
        if !self.in_flight.is_empty() {
            debug!("restarted {} in-flight searches", self.in_flight.len());
        }
    }

    /// Spend one tick of budget on every search. Returns responses for the
    /// searches that finished, ordered by agent id.
    pub fn advance(&mut self, grid: &Grid, terrain: &impl TerrainProvider) -> Vec<PathResponse> {
        let budget = self.expansions_per_tick;
        let mut finished: Vec<(AgentId, Option<PathSearchResult>)> = self
            .in_flight
            .par_iter_mut()
            .filter_map(|(&agent, flight)| match flight.search.as_mut() {
                None => Some((agent, None)),
                Some(search) => match search.advance(grid, budget) {
                    SearchStatus::Pending => None,
                    SearchStatus::Done(result) => Some((agent, Some(result))),
                },
            })
            .collect();
        finished.sort_by_key(|(agent, _)| *agent);

        let mut responses = Vec::with_capacity(finished.len());
        for (agent, result) in finished {
            let Some(flight) = self.in_flight.remove(&agent) else {
                continue;
            };
            let response = match result {
                Some(result) if result.found => PathResponse {
                    agent,
                    generation: flight.generation,
                    leaf: flight.leaf,
                    waypoints: simplify_path(&result.cells, grid, terrain),
                    cells: result.cells,
                    actionable: flight.actionable,
                    success: true,
                    cost: result.cost,
                },
                _ => PathResponse {
                    agent,
                    generation: flight.generation,
                    leaf: flight.leaf,
                    waypoints: Vec::new(),
                    cells: Vec::new(),
                    actionable: flight.actionable,
                    success: false,
                    cost: 0,
                },
            };
            debug!(
                "{agent}: path for {} {} (cost {}, {} waypoints)",
                response.leaf,
                if response.success { "found" } else { "failed" },
                response.cost,
                response.waypoints.len()
            );
            responses.push(response);
        }
        responses
    }
}
