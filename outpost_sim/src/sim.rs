// Core simulation state and tick loop.
//
// `Sim` is the single owner of everything the core needs: the config, the
// terrain collaborator, the pathfinding grid, the task graph and queue, the
// actionables, the path request manager and the agents. Components never
// look each other up; `Sim` passes each one the references it needs.
//
// ## Tick loop
//
// `tick(dt)` advances simulated time by `dt` seconds:
//
//   1. Every in-flight path search gets one tick of expansion budget
//      (`PathRequestManager::advance`). Finished searches are delivered to
//      their agents in agent-id order. A response whose generation does not
//      match the agent's outstanding request is dropped.
//   2. Every agent, in id order, advances its `Activity` by one step:
//      - `Idle` with no task: count down the poll timer (and any failure
//        back-off); when due, ask the queue for the next runnable task.
//      - `Idle` with a task: start the next leaf, i.e. request a path to its
//        target. No leaves left means the task is finished.
//      - `AwaitingPath`: nothing; the response arrives in step 1.
//      - `FollowingPath`: steer along the path; on arrival switch to
//        `PerformingAction`.
//      - `PerformingAction`: hand `dt * action speed` of work to the leaf's
//        actionable; completion >= 1 ends the leaf and starts the next one
//        in the same tick. A leaf without an actionable completes on
//        arrival.
//
// A failed path (unreachable or no provider) gives the task back to the
// queue and puts the agent into back-off for `unreachable_backoff` seconds.
//
// ## Outside mutations
//
// Producers create and cancel tasks, add actionables, spawn/despawn agents
// and report terrain edits through methods on `Sim`. Their events are
// buffered and returned by the next `tick`.
//
// Terrain edits are two-step: mutate the provider via `terrain_mut()`, then
// call `terrain_changed(bounds)`. The grid rebuilds the region completely,
// every in-flight search restarts against the rebuilt grid, and observing
// agents whose current route crosses the edit request a new path (they keep
// following the old one until it arrives).
//
// See also: `agent.rs` for agent state, `scheduler.rs` and `task.rs` for
// the task side, `request.rs` for path requests, `event.rs` for the
// emitted events.
//
// **Critical constraint: determinism.** Agents live in a `BTreeMap` and are
// updated in id order; path responses are delivered in agent order; all
// ids are monotonic. Identical inputs give identical event streams.

use crate::actionable::{Actionable, ActionableRegistry};
use crate::agent::{Activity, Agent};
use crate::config::SimConfig;
use crate::event::{SimEvent, SimEventKind, StepResult};
use crate::grid::Grid;
use crate::path::FollowStatus;
use crate::pathfinding::{PathSearchResult, find_path};
use crate::profile::AgentKind;
use crate::request::{PathRequest, PathRequestManager, PathResponse};
use crate::scheduler::TaskQueue;
use crate::task::{NewTask, TaskGraph};
use crate::terrain::TerrainProvider;
use crate::types::{ActionableId, AgentId, Bounds, CellCoord, LeafRef, TaskId};
use glam::Vec3;
use log::{debug, trace, warn};
use std::collections::BTreeMap;

pub struct Sim<T: TerrainProvider> {
    config: SimConfig,
    terrain: T,
    grid: Grid,
    tasks: TaskGraph,
    queue: TaskQueue,
    actionables: ActionableRegistry,
    requests: PathRequestManager,
    agents: BTreeMap<AgentId, Agent>,
    next_agent_id: u64,
    tick: u64,
    elapsed: f64,
    /// Events from outside mutations, returned by the next `tick`.
    pending_events: Vec<SimEvent>,
}

impl<T: TerrainProvider> Sim<T> {
    /// Build the grid from `terrain` and start at tick 0 with no agents or
    /// tasks.
    pub fn new(config: SimConfig, terrain: T) -> Self {
        let grid = Grid::build(&config.grid, &terrain);
        let requests = PathRequestManager::new(config.search.expansions_per_tick);
        Self {
            config,
            terrain,
            grid,
            tasks: TaskGraph::new(),
            queue: TaskQueue::new(),
            actionables: ActionableRegistry::new(),
            requests,
            agents: BTreeMap::new(),
            next_agent_id: 0,
            tick: 0,
            elapsed: 0.0,
            pending_events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds since construction.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn terrain(&self) -> &T {
        &self.terrain
    }

    /// Mutable terrain access. Follow every edit with `terrain_changed`.
    pub fn terrain_mut(&mut self) -> &mut T {
        &mut self.terrain
    }

    pub fn tasks(&self) -> &TaskGraph {
        &self.tasks
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn actionables(&self) -> &ActionableRegistry {
        &self.actionables
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn is_path_pending(&self, agent: AgentId) -> bool {
        self.requests.is_pending(agent)
    }

    /// One-shot search on the current grid, outside the agent machinery.
    pub fn find_path(&self, start: CellCoord, goal: CellCoord) -> PathSearchResult {
        find_path(&self.grid, start, goal)
    }

    fn record(&mut self, kind: SimEventKind) {
        self.pending_events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    // -----------------------------------------------------------------------
    // Outside mutations
    // -----------------------------------------------------------------------

    pub fn spawn_agent(&mut self, kind: AgentKind, position: Vec3) -> AgentId {
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        self.agents.insert(id, Agent::new(id, kind, position));
        debug!("spawned {id} ({kind:?}) at {position}");
        self.record(SimEventKind::AgentSpawned { agent: id, kind });
        id
    }

    /// Remove an agent. Its search is cancelled and its task, if any, goes
    /// back to the queue.
    pub fn despawn_agent(&mut self, id: AgentId) -> bool {
        let Some(mut agent) = self.agents.remove(&id) else {
            return false;
        };
        self.grid.remove_terrain_observer(id);
        self.requests.cancel(id);
        if let Some(task) = agent.abandon_task() {
            if self.queue.requeue(task, &mut self.tasks) {
                self.record(SimEventKind::TaskRequeued { task, agent: id });
            }
        }
        self.record(SimEventKind::AgentDespawned { agent: id });
        true
    }

    pub fn add_actionable(&mut self, actionable: Box<dyn Actionable>) -> ActionableId {
        self.actionables.insert(actionable)
    }

    /// Create a task in the graph and append it to the queue.
    pub fn create_task(&mut self, new: NewTask) -> TaskId {
        let id = self.tasks.create(new, &mut self.actionables);
        self.queue.enqueue(id);
        self.record(SimEventKind::TaskEnqueued { task: id });
        id
    }

    /// Cancel a pending or assigned task. A holding agent drops it and
    /// goes idle. Tasks blocked by this one stay blocked, but a template
    /// left with no clones or repeats finishes.
    pub fn cancel_task(&mut self, id: TaskId) -> bool {
        let Some(outcome) = self.queue.cancel(id, &mut self.tasks, &mut self.actionables) else {
            return false;
        };
        let holder = outcome
            .agent
            .and_then(|agent_id| self.agents.get_mut(&agent_id))
            .filter(|agent| agent.task == Some(id));
        if let Some(agent) = holder {
            let agent_id = agent.id;
            agent.abandon_task();
            self.requests.cancel(agent_id);
            self.grid.remove_terrain_observer(agent_id);
            debug!("{agent_id} abandoned cancelled {id}");
        }
        self.record(SimEventKind::TaskCancelled { task: id });
        for template in outcome.finished {
            self.record(SimEventKind::TaskFinished { task: template });
        }
        true
    }

    /// Rebuild the grid over `bounds` from the terrain provider and notify
    /// observing agents.
    pub fn terrain_changed(&mut self, bounds: Bounds) {
        let change = self.grid.rebuild_region(bounds, &self.terrain);
        self.requests.restart_all(&self.grid);
        self.record(SimEventKind::TerrainChanged { bounds: change.bounds });

        for observer in change.observers {
            let Some(agent) = self.agents.get_mut(&observer) else {
                continue;
            };
            if !agent.route_crosses(&change.bounds) {
                continue;
            }
            let Some(leaf) = agent.current_leaf() else {
                continue;
            };
            let Some(leaf_task) = self.tasks.leaf(leaf) else {
                continue;
            };
            let request = PathRequest {
                agent: observer,
                from: agent.position,
                leaf,
                target: leaf_task.target,
                actionable: leaf_task.actionable,
            };
            let generation = self.requests.request(request, &self.grid, &self.actionables);
            agent.pending_request = Some(generation);
            self.pending_events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::PathInvalidated { agent: observer },
            });
        }
    }

    /// Drop finished and cancelled tasks nothing refers to any more.
    /// Returns how many were removed.
    pub fn prune_finished_tasks(&mut self) -> usize {
        self.tasks.prune_terminal()
    }

    // -----------------------------------------------------------------------
    // Tick loop
    // -----------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> StepResult {
        self.tick += 1;
        self.elapsed += f64::from(dt);
        let mut events = std::mem::take(&mut self.pending_events);

        for response in self.requests.advance(&self.grid, &self.terrain) {
            self.deliver_path(response, &mut events);
        }

        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in ids {
            let Some(mut agent) = self.agents.remove(&id) else {
                continue;
            };
            self.update_agent(&mut agent, dt, &mut events);
            self.agents.insert(id, agent);
        }

        StepResult { events }
    }

    /// Run `ticks` ticks of `dt` and collect all events.
    pub fn run(&mut self, ticks: u64, dt: f32) -> Vec<SimEvent> {
        let mut all = Vec::new();
        for _ in 0..ticks {
            all.extend(self.tick(dt).events);
        }
        all
    }

    fn emit(&self, events: &mut Vec<SimEvent>, kind: SimEventKind) {
        events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    fn deliver_path(&mut self, response: PathResponse, events: &mut Vec<SimEvent>) {
        let Some(mut agent) = self.agents.remove(&response.agent) else {
            return;
        };
        if agent.accepts(&response) {
            self.apply_path(&mut agent, response, events);
        } else {
            trace!(
                "{}: dropped stale path response (generation {})",
                response.agent, response.generation
            );
        }
        self.agents.insert(agent.id, agent);
    }

    fn apply_path(
        &mut self,
        agent: &mut Agent,
        response: PathResponse,
        events: &mut Vec<SimEvent>,
    ) {
        let leaf = response.leaf;
        if !response.success {
            self.emit(events, SimEventKind::PathFailed { leaf, agent: agent.id });
            self.give_up(agent, events);
            return;
        }

        if let Some(resolved) = response.actionable {
            self.bind_actionable(leaf, resolved);
        }
        let profile = self.config.profile(agent.kind);
        agent.start_following(leaf, &response, &profile);
        self.emit(
            events,
            SimEventKind::PathFound {
                leaf,
                agent: agent.id,
                cost: response.cost,
                waypoints: response.waypoints.len(),
            },
        );
    }

    /// Point a leaf at the actionable its target resolved to, moving the
    /// association if it previously pointed elsewhere.
    fn bind_actionable(&mut self, leaf: LeafRef, resolved: ActionableId) {
        let Some(leaf_task) = self.tasks.leaf_mut(leaf) else {
            return;
        };
        if leaf_task.actionable == Some(resolved) {
            return;
        }
        if let Some(previous) = leaf_task.actionable.replace(resolved) {
            self.actionables.clear(previous, leaf);
        }
        self.actionables.associate(resolved, leaf);
    }

    /// Return the agent's task to the queue after a failed path and back
    /// off before polling again.
    fn give_up(&mut self, agent: &mut Agent, events: &mut Vec<SimEvent>) {
        self.grid.remove_terrain_observer(agent.id);
        agent.backoff = self.config.scheduler.unreachable_backoff;
        let Some(task) = agent.abandon_task() else {
            return;
        };
        if self.queue.requeue(task, &mut self.tasks) {
            warn!("{}: target unreachable, requeued {task}", agent.id);
            self.emit(events, SimEventKind::TaskRequeued { task, agent: agent.id });
        }
    }

    fn update_agent(&mut self, agent: &mut Agent, dt: f32, events: &mut Vec<SimEvent>) {
        match &mut agent.activity {
            Activity::Idle => {
                if agent.task.is_none() && !self.try_assign(agent, dt, events) {
                    return;
                }
                self.start_next_leaf(agent, events);
            }
            Activity::AwaitingPath { .. } => {}
            Activity::FollowingPath { leaf, follower } => {
                let leaf = *leaf;
                let profile = self.config.profile(agent.kind);
                let status = follower.advance(
                    &mut agent.position,
                    &mut agent.heading,
                    Agent::steering(&profile),
                    dt,
                );
                if status == FollowStatus::Arrived {
                    trace!("{} arrived for {leaf}", agent.id);
                    agent.activity = Activity::PerformingAction { leaf };
                    self.grid.remove_terrain_observer(agent.id);
                    if agent.pending_request.take().is_some() {
                        self.requests.cancel(agent.id);
                    }
                }
            }
            Activity::PerformingAction { leaf } => {
                let leaf = *leaf;
                if self.perform(agent, leaf, dt) >= 1.0 {
                    self.emit(events, SimEventKind::LeafCompleted { leaf, agent: agent.id });
                    agent.activity = Activity::Idle;
                    self.start_next_leaf(agent, events);
                }
            }
        }
    }

    /// Poll the scheduler for an idle agent. Returns true if a task was
    /// assigned.
    fn try_assign(&mut self, agent: &mut Agent, dt: f32, events: &mut Vec<SimEvent>) -> bool {
        if !agent.poll_due(dt, self.config.scheduler.idle_poll_interval) {
            return false;
        }
        let Some(task) = self
            .queue
            .next_runnable_for(agent.id, &mut self.tasks, &mut self.actionables)
        else {
            return false;
        };
        let leaf_count = self.tasks.get(task).map_or(0, |t| t.leaves.len());
        agent.begin_task(task, (0..leaf_count).map(|index| LeafRef { task, index }));
        self.emit(events, SimEventKind::TaskAssigned { task, agent: agent.id });
        true
    }

    /// Request a path for the agent's next leaf, or finish its task when no
    /// leaves remain.
    fn start_next_leaf(&mut self, agent: &mut Agent, events: &mut Vec<SimEvent>) {
        let Some(task) = agent.task else {
            return;
        };
        let Some(leaf) = agent.leaf_queue.pop_front() else {
            agent.abandon_task();
            agent.poll_timer = 0.0;
            for finished in self.tasks.mark_finished(task, &mut self.actionables) {
                self.emit(events, SimEventKind::TaskFinished { task: finished });
            }
            return;
        };
        let Some(leaf_task) = self.tasks.leaf(leaf) else {
            warn!("{}: {leaf} vanished, dropping {task}", agent.id);
            agent.abandon_task();
            return;
        };
        let request = PathRequest {
            agent: agent.id,
            from: agent.position,
            leaf,
            target: leaf_task.target,
            actionable: leaf_task.actionable,
        };
        agent.pending_request = Some(self.requests.request(request, &self.grid, &self.actionables));
        agent.activity = Activity::AwaitingPath { leaf };
        self.grid.add_terrain_observer(agent.id);
        self.emit(events, SimEventKind::LeafStarted { leaf, agent: agent.id });
    }

    /// One tick of work on a leaf's action. Leaves without a live
    /// actionable complete immediately.
    fn perform(&mut self, agent: &Agent, leaf: LeafRef, dt: f32) -> f32 {
        let Some(leaf_task) = self.tasks.leaf(leaf) else {
            return 1.0;
        };
        let action = leaf_task.action;
        let Some(target) = leaf_task.actionable.and_then(|id| self.actionables.get_mut(id)) else {
            return 1.0;
        };
        let speed = self.config.profile(agent.kind).speed_for(action);
        target.perform_action(leaf, action, dt * speed, agent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actionable::WorkSite;
    use crate::config::GridConfig;
    use crate::task::{LeafTask, TaskState, TaskTarget};
    use crate::terrain::HeightmapTerrain;
    use crate::types::{ActionKind, ResourceKind, TaskCategory};
    use glam::Vec2;

    const DT: f32 = 0.05;

    fn test_sim(size: u32) -> Sim<HeightmapTerrain> {
        let config = SimConfig {
            grid: GridConfig {
                width: size,
                height: size,
                blur_radius: 0,
                ..GridConfig::default()
            },
            ..SimConfig::default()
        };
        let terrain = HeightmapTerrain::flat(size, size, 1.0, Vec2::ZERO);
        Sim::new(config, terrain)
    }

    fn center(x: i32, y: i32) -> Vec3 {
        Vec3::new(x as f32 + 0.5, 0.0, y as f32 + 0.5)
    }

    fn go(x: i32, y: i32, action: ActionKind) -> LeafTask {
        LeafTask::new("go", TaskTarget::Position(center(x, y)), action)
    }

    fn run_until(
        sim: &mut Sim<HeightmapTerrain>,
        max_ticks: u64,
        mut done: impl FnMut(&SimEvent) -> bool,
    ) -> Vec<SimEvent> {
        let mut all = Vec::new();
        for _ in 0..max_ticks {
            let step = sim.tick(DT);
            let hit = step.events.iter().any(&mut done);
            all.extend(step.events);
            if hit {
                break;
            }
        }
        all
    }

    #[test]
    fn tick_advances_clock_and_flushes_outside_events() {
        let mut sim = test_sim(8);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let step = sim.tick(DT);
        assert_eq!(sim.current_tick(), 1);
        assert!((sim.elapsed() - f64::from(DT)).abs() < 1e-9);
        assert!(
            step.events
                .iter()
                .any(|e| e.kind == SimEventKind::AgentSpawned { agent, kind: AgentKind::Worker })
        );
        assert!(sim.tick(DT).events.is_empty());
    }

    #[test]
    fn agent_walks_both_legs_and_finishes_task() {
        let mut sim = test_sim(10);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "patrol",
            vec![go(5, 0, ActionKind::PickUp), go(5, 5, ActionKind::DropOff)],
        ));

        let events = run_until(&mut sim, 1000, |e| e.kind == SimEventKind::TaskFinished { task });
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskAssigned { task, agent }));
        let completed = events
            .iter()
            .filter(|e| matches!(e.kind, SimEventKind::LeafCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
        assert_eq!(sim.tasks().state(task), Some(TaskState::Finished));

        let a = sim.agent(agent).unwrap();
        assert!(a.is_idle());
        assert!(a.position.distance(center(5, 5)) < 0.5, "ended at {}", a.position);
        assert!(sim.grid().terrain_observers().next().is_none());
    }

    #[test]
    fn unreachable_target_requeues_and_backs_off() {
        let mut sim = test_sim(10);
        let wall = Bounds::new(CellCoord::new(6, 6), CellCoord::new(8, 8));
        sim.terrain_mut().fill_walkable(wall, false);
        sim.terrain_mut().set_walkable(CellCoord::new(7, 7), true);
        sim.terrain_changed(wall);

        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "enclosed",
            vec![go(7, 7, ActionKind::PickUp)],
        ));

        let events = run_until(&mut sim, 20, |e| {
            matches!(e.kind, SimEventKind::TaskRequeued { .. })
        });
        assert!(events.iter().any(|e| {
            matches!(e.kind, SimEventKind::PathFailed { agent: a, .. } if a == agent)
        }));
        assert!(sim.queue().contains(task));
        assert_eq!(sim.tasks().state(task), Some(TaskState::Pending));
        let a = sim.agent(agent).unwrap();
        assert!(a.is_idle());
        assert!(a.backoff > 0.0);
    }

    #[test]
    fn nearest_target_resolves_and_repeat_template_finishes() {
        let mut sim = test_sim(10);
        let deposit =
            sim.add_actionable(Box::new(WorkSite::deposit(center(3, 0), ResourceKind::Ore, 0.5)));
        sim.spawn_agent(AgentKind::Miner, center(0, 0));
        let template = sim.create_task(
            NewTask::new(
                TaskCategory::Mine,
                "mine ore",
                vec![LeafTask::new(
                    "mine",
                    TaskTarget::Nearest(ResourceKind::Ore),
                    ActionKind::Mine,
                )],
            )
            .repeat(2),
        );

        let events = run_until(&mut sim, 2000, |e| {
            e.kind == SimEventKind::TaskFinished { task: template }
        });
        let finished: Vec<TaskId> = events
            .iter()
            .filter_map(|e| match e.kind {
                SimEventKind::TaskFinished { task } => Some(task),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 3, "two clones then the template: {finished:?}");
        assert_eq!(finished.last(), Some(&template));
        for clone in &finished[..2] {
            let task = sim.tasks().get(*clone).unwrap();
            assert_eq!(task.parent, Some(template));
            assert_eq!(task.leaves[0].actionable, Some(deposit));
        }
        assert!(sim.queue().is_empty());
    }

    #[test]
    fn cancel_assigned_task_idles_agent() {
        let mut sim = test_sim(20);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "far",
            vec![go(19, 19, ActionKind::PickUp)],
        ));
        sim.run(3, DT);
        assert_eq!(sim.agent(agent).unwrap().task, Some(task));

        assert!(sim.cancel_task(task));
        assert!(!sim.cancel_task(task));
        let a = sim.agent(agent).unwrap();
        assert!(a.is_idle());
        assert!(!sim.is_path_pending(agent));
        assert_eq!(sim.tasks().state(task), Some(TaskState::Cancelled));
        let events = sim.tick(DT).events;
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskCancelled { task }));
    }

    #[test]
    fn finishing_agent_takes_next_task_on_the_following_tick() {
        let mut sim = test_sim(10);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let first = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "first",
            vec![go(3, 0, ActionKind::PickUp)],
        ));
        let second = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "second",
            vec![go(3, 3, ActionKind::PickUp)],
        ));

        let events = run_until(&mut sim, 1000, |e| {
            matches!(e.kind, SimEventKind::TaskAssigned { task, .. } if task == second)
        });
        let tick_of = |kind: SimEventKind| events.iter().find(|e| e.kind == kind).map(|e| e.tick);
        let finished = tick_of(SimEventKind::TaskFinished { task: first }).unwrap();
        let assigned = tick_of(SimEventKind::TaskAssigned { task: second, agent }).unwrap();
        assert_eq!(assigned, finished + 1);
    }

    #[test]
    fn cancelling_sole_clone_finishes_template_and_frees_dependent() {
        let mut sim = test_sim(20);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let template = sim.create_task(
            NewTask::new(TaskCategory::Move, "once", vec![go(19, 19, ActionKind::PickUp)])
                .repeat(1),
        );
        let after = sim.create_task(
            NewTask::new(TaskCategory::Move, "after", vec![go(1, 0, ActionKind::PickUp)])
                .blocked_by(template),
        );
        sim.run(3, DT);
        let clone = sim.agent(agent).unwrap().task.unwrap();
        assert_ne!(clone, template);

        assert!(sim.cancel_task(clone));
        assert_eq!(sim.tasks().state(template), Some(TaskState::Finished));
        let events = sim.tick(DT).events;
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskCancelled { task: clone }));
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskFinished { task: template }));

        let events = run_until(&mut sim, 500, |e| {
            e.kind == SimEventKind::TaskFinished { task: after }
        });
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskAssigned { task: after, agent }));
    }

    #[test]
    fn pruning_drops_unreferenced_terminal_tasks() {
        let mut sim = test_sim(8);
        sim.spawn_agent(AgentKind::Worker, center(0, 0));
        let template = sim.create_task(
            NewTask::new(TaskCategory::Move, "loop", vec![go(2, 0, ActionKind::PickUp)]).repeat(2),
        );
        let dropped = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "dropped",
            vec![go(4, 4, ActionKind::PickUp)],
        ));
        let stuck = sim.create_task(
            NewTask::new(TaskCategory::Move, "stuck", vec![go(5, 5, ActionKind::PickUp)])
                .blocked_by(dropped),
        );
        assert!(sim.cancel_task(dropped));
        run_until(&mut sim, 2000, |e| e.kind == SimEventKind::TaskFinished { task: template });
        assert_eq!(sim.tasks().len(), 5);

        // The template and both clones go; the cancelled blocker stays
        // because the stuck task still names it.
        assert_eq!(sim.prune_finished_tasks(), 3);
        assert!(sim.tasks().get(template).is_none());
        assert!(sim.tasks().get(dropped).is_some());
        assert_eq!(sim.tasks().state(stuck), Some(TaskState::Pending));
        assert_eq!(sim.prune_finished_tasks(), 0);
    }

    #[test]
    fn terrain_edit_across_route_requests_new_path() {
        let mut sim = test_sim(20);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 10));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Move,
            "cross",
            vec![go(19, 10, ActionKind::PickUp)],
        ));
        run_until(&mut sim, 50, |e| matches!(e.kind, SimEventKind::PathFound { .. }));

        let wall = Bounds::new(CellCoord::new(12, 5), CellCoord::new(12, 15));
        sim.terrain_mut().fill_walkable(wall, false);
        sim.terrain_changed(wall);

        let events = run_until(&mut sim, 2000, |e| e.kind == SimEventKind::TaskFinished { task });
        assert!(events.iter().any(|e| e.kind == SimEventKind::PathInvalidated { agent }));
        assert!(events.iter().any(|e| matches!(e.kind, SimEventKind::TerrainChanged { .. })));
        assert_eq!(sim.tasks().state(task), Some(TaskState::Finished));
    }

    #[test]
    fn terrain_edit_elsewhere_leaves_route_alone() {
        let mut sim = test_sim(20);
        let agent = sim.spawn_agent(AgentKind::Worker, center(0, 0));
        sim.create_task(NewTask::new(
            TaskCategory::Move,
            "short",
            vec![go(5, 0, ActionKind::PickUp)],
        ));
        run_until(&mut sim, 50, |e| matches!(e.kind, SimEventKind::PathFound { .. }));

        let far = Bounds::single(CellCoord::new(15, 15));
        sim.terrain_mut().fill_walkable(far, false);
        sim.terrain_changed(far);
        let events = sim.tick(DT).events;
        assert!(!events.iter().any(|e| e.kind == SimEventKind::PathInvalidated { agent }));
    }

    #[test]
    fn despawn_requeues_held_task() {
        let mut sim = test_sim(10);
        let agent = sim.spawn_agent(AgentKind::Builder, center(0, 0));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Build,
            "build",
            vec![go(9, 9, ActionKind::Build)],
        ));
        sim.run(2, DT);
        assert_eq!(sim.agent(agent).unwrap().task, Some(task));

        assert!(sim.despawn_agent(agent));
        assert!(!sim.despawn_agent(agent));
        assert!(sim.queue().contains(task));
        assert_eq!(sim.tasks().state(task), Some(TaskState::Pending));
        let events = sim.tick(DT).events;
        assert!(events.iter().any(|e| e.kind == SimEventKind::TaskRequeued { task, agent }));
        assert!(events.iter().any(|e| e.kind == SimEventKind::AgentDespawned { agent }));
    }

    #[test]
    fn work_on_actionable_scales_with_action_speed() {
        let mut sim = test_sim(6);
        let site = sim.add_actionable(Box::new(WorkSite::new(center(1, 0), 1.0)));
        let agent = sim.spawn_agent(AgentKind::AdvancedBuilder, center(0, 0));
        let task = sim.create_task(NewTask::new(
            TaskCategory::Build,
            "wall",
            vec![go(1, 0, ActionKind::Build).with_actionable(site)],
        ));
        let events = run_until(&mut sim, 1000, |e| e.kind == SimEventKind::TaskFinished { task });

        let arrived = events
            .iter()
            .find(|e| matches!(e.kind, SimEventKind::PathFound { .. }))
            .map(|e| e.tick)
            .unwrap();
        let done = events.last().unwrap().tick;
        assert!(done > arrived);
        // Build speed 2.0 at 0.05 s per tick: ten ticks of work after arrival.
        assert!(done - arrived < 60, "took {} ticks", done - arrived);
        assert!(sim.agent(agent).unwrap().is_idle());
    }
}
