// Autonomous agents and their per-tick activity state.
//
// An `Agent` is pure data plus small state-transition helpers. It holds at
// most one composite task, the queue of that task's remaining leaves, and
// an `Activity` describing what it is doing right now:
//
//   Idle ──assign──> AwaitingPath ──path found──> FollowingPath
//     ^                   │                            │ arrived
//     │              path failed                       v
//     └──requeue + back-off──┘          PerformingAction ──leaf done──> next leaf
//
// The transitions themselves are driven by `Sim::tick`, which owns the
// scheduler, the path request manager and the actionables. Path requests
// are asynchronous: the agent remembers the generation of its outstanding
// request and accepts only a response carrying that generation. While a
// replacement path is pending (after a terrain edit) the agent keeps
// following its current one.
//
// See also: `sim.rs` for the tick loop, `path.rs` for `PathFollower`,
// `profile.rs` for per-kind speeds.

use crate::path::{Path, PathFollower, Steering};
use crate::profile::{AgentKind, AgentProfile};
use crate::request::PathResponse;
use crate::types::{AgentId, Bounds, CellCoord, LeafRef, TaskId};
use glam::{Vec2, Vec3};
use std::collections::VecDeque;

/// What an agent is doing this tick.
#[derive(Clone, Debug)]
pub enum Activity {
    /// No leaf in progress. Polls the scheduler when it holds no task.
    Idle,
    /// Waiting for the path to `leaf`.
    AwaitingPath { leaf: LeafRef },
    FollowingPath { leaf: LeafRef, follower: PathFollower },
    /// At the target, working the leaf's action.
    PerformingAction { leaf: LeafRef },
}

#[derive(Clone, Debug)]
pub struct Agent {
    pub id: AgentId,
    pub kind: AgentKind,
    /// World position; x/z horizontal, y up.
    pub position: Vec3,
    /// Unit planar facing.
    pub heading: Vec2,
    pub task: Option<TaskId>,
    pub leaf_queue: VecDeque<LeafRef>,
    pub activity: Activity,
    /// Generation of the outstanding path request, if any.
    pub pending_request: Option<u64>,
    /// Final cell of the current route.
    pub target_cell: Option<CellCoord>,
    /// Seconds until the next scheduler poll.
    pub poll_timer: f32,
    /// Seconds left before the agent may poll again after a failure.
    pub backoff: f32,
}

impl Agent {
    pub fn new(id: AgentId, kind: AgentKind, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            heading: Vec2::X,
            task: None,
            leaf_queue: VecDeque::new(),
            activity: Activity::Idle,
            pending_request: None,
            target_cell: None,
            poll_timer: 0.0,
            backoff: 0.0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.task.is_none() && matches!(self.activity, Activity::Idle)
    }

    /// The leaf in progress, if any.
    pub fn current_leaf(&self) -> Option<LeafRef> {
        match &self.activity {
            Activity::Idle => None,
            Activity::AwaitingPath { leaf }
            | Activity::FollowingPath { leaf, .. }
            | Activity::PerformingAction { leaf } => Some(*leaf),
        }
    }

    /// Whether the agent is on its way somewhere (and so interested in
    /// terrain edits).
    pub fn is_navigating(&self) -> bool {
        matches!(self.activity, Activity::AwaitingPath { .. } | Activity::FollowingPath { .. })
    }

    /// Take on a task with its leaves in order.
    pub fn begin_task(&mut self, task: TaskId, leaves: impl IntoIterator<Item = LeafRef>) {
        self.task = Some(task);
        self.leaf_queue = leaves.into_iter().collect();
        self.activity = Activity::Idle;
    }

    /// Drop the current task and everything in progress. Returns the task.
    pub fn abandon_task(&mut self) -> Option<TaskId> {
        self.leaf_queue.clear();
        self.activity = Activity::Idle;
        self.pending_request = None;
        self.target_cell = None;
        self.task.take()
    }

    /// Whether a path response belongs to the request this agent is waiting
    /// on.
    pub fn accepts(&self, response: &PathResponse) -> bool {
        self.pending_request == Some(response.generation)
            && self.current_leaf() == Some(response.leaf)
    }

    /// Switch to following a freshly found route. The first waypoint is the
    /// agent's own cell and is skipped when there is more than one.
    pub fn start_following(
        &mut self,
        leaf: LeafRef,
        response: &PathResponse,
        profile: &AgentProfile,
    ) {
        let waypoints = match response.waypoints.as_slice() {
            [_, rest @ ..] if !rest.is_empty() => rest.to_vec(),
            all => all.to_vec(),
        };
        let path = Path::new(
            waypoints,
            self.position,
            profile.turn_distance,
            profile.stopping_distance,
        );
        self.target_cell = response.cells.last().copied();
        self.pending_request = None;
        self.activity = Activity::FollowingPath {
            leaf,
            follower: PathFollower::new(path, response.cells.clone()),
        };
    }

    /// Whether a terrain edit inside `bounds` invalidates the route being
    /// followed: it must cross a path cell or the target cell.
    pub fn route_crosses(&self, bounds: &Bounds) -> bool {
        let Activity::FollowingPath { follower, .. } = &self.activity else {
            return false;
        };
        self.target_cell.is_some_and(|c| bounds.contains(c))
            || follower.cells().iter().any(|c| bounds.contains(*c))
    }

    pub fn steering(profile: &AgentProfile) -> Steering {
        Steering {
            move_speed: profile.move_speed,
            turn_speed: profile.turn_speed,
        }
    }

    /// Count down the poll timer and back-off. Returns true when an idle
    /// agent should ask the scheduler for work this tick.
    pub fn poll_due(&mut self, dt: f32, interval: f32) -> bool {
        if self.backoff > 0.0 {
            self.backoff = (self.backoff - dt).max(0.0);
            return false;
        }
        self.poll_timer -= dt;
        if self.poll_timer <= 0.0 {
            self.poll_timer = interval;
            true
        } else {
            false
        }
    }
}
