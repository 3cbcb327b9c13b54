// Narrative events emitted by the simulation.
//
// Every state change an observer might care about (task lifecycle, path
// results, terrain edits) is reported as a `SimEvent` stamped with the tick
// it happened on. `Sim::tick` and the direct `Sim` mutators collect them
// into a `StepResult`; the headless runner logs them and tests assert on
// them. Events are output only: nothing inside the sim reads them back.
//
// See also: `sim.rs` where events are produced, `types.rs` for the ids
// they carry.
//
// **Critical constraint: determinism.** Events within one tick appear in
// processing order (path responses by agent id, then agents by id), so two
// runs with the same inputs emit identical streams.

use crate::profile::AgentKind;
use crate::types::{AgentId, Bounds, LeafRef, TaskId};
use serde::{Deserialize, Serialize};

/// A narrative event stamped with its tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    AgentSpawned { agent: AgentId, kind: AgentKind },
    AgentDespawned { agent: AgentId },
    TaskEnqueued { task: TaskId },
    TaskAssigned { task: TaskId, agent: AgentId },
    /// The agent moved on to a new leaf and asked for a path.
    LeafStarted { leaf: LeafRef, agent: AgentId },
    PathFound { leaf: LeafRef, agent: AgentId, cost: u32, waypoints: usize },
    PathFailed { leaf: LeafRef, agent: AgentId },
    /// The task went back to the queue (unreachable target or despawn).
    TaskRequeued { task: TaskId, agent: AgentId },
    LeafCompleted { leaf: LeafRef, agent: AgentId },
    TaskFinished { task: TaskId },
    TaskCancelled { task: TaskId },
    TerrainChanged { bounds: Bounds },
    /// A terrain edit crossed the agent's route; a new path was requested.
    PathInvalidated { agent: AgentId },
}

/// Everything one call to `Sim::tick` produced.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    pub events: Vec<SimEvent>,
}

impl StepResult {
    /// Events of the given shape, for tests and filters.
    pub fn matching<'a>(
        &'a self,
        pred: impl Fn(&SimEventKind) -> bool + 'a,
    ) -> impl Iterator<Item = &'a SimEvent> + 'a {
        self.events.iter().filter(move |e| pred(&e.kind))
    }
}
