// Task queue: pending composite tasks awaiting assignment.
//
// The queue holds `TaskId`s in insertion order; the task data itself lives
// in the `TaskGraph`. `next_runnable_for` scans front to back and hands out
// the first task whose blocker is clear and whose leaf start conditions all
// hold. The scan is linear. Queue depth is bounded by the world's task
// volume, so no ready-index is kept.
//
// Repeat templates stay in the queue while they still have repeats: each
// selection spawns one clone (via `TaskGraph::clone_once`) and assigns the
// clone, so one authored "mine 5 loads" task feeds several agents in turn.
// The template drops out of the queue when its count reaches zero and
// finishes on its own once its last live clone finishes or is cancelled.
//
// Requeued tasks (path proved unreachable, agent despawned) go to the back
// with no per-task back-off; the agent that gave up backs off instead.
//
// See also: `task.rs` for the graph and state transitions, `sim.rs` for the
// idle polling that calls into this queue and the agent side of cancel.

use crate::actionable::ActionableRegistry;
use crate::task::{TaskGraph, TaskState};
use crate::types::{AgentId, TaskId};
use log::debug;
use std::collections::VecDeque;

/// What `TaskQueue::cancel` did, so the caller can finish the job on the
/// agent side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelOutcome {
    /// The task was waiting in the queue and has been removed.
    pub was_queued: bool,
    /// The agent that held the task and must abandon it.
    pub agent: Option<AgentId>,
    /// Templates that finished because their last live clone was cancelled.
    pub finished: Vec<TaskId>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back. Ids already queued are not duplicated.
    pub fn enqueue(&mut self, id: TaskId) {
        if !self.contains(id) {
            self.pending.push_back(id);
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.pending.contains(&id)
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.pending.iter().position(|&t| t == id) {
            Some(i) => {
                self.pending.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.pending.iter().copied()
    }

    /// Select, dequeue and assign the first runnable task for `agent`.
    ///
    /// Entries whose task has gone terminal are dropped during the scan.
    /// A runnable template yields a fresh clone instead of itself.
    pub fn next_runnable_for(
        &mut self,
        agent: AgentId,
        graph: &mut TaskGraph,
        actionables: &mut ActionableRegistry,
    ) -> Option<TaskId> {
        self.pending
            .retain(|id| graph.state(*id).is_some_and(|s| !s.is_terminal()));

        let index = self
            .pending
            .iter()
            .position(|&id| graph.satisfies_start_requirements(id))?;
        let id = self.pending[index];

        let chosen = match graph.get(id).map(|t| t.is_template()) {
            Some(true) => {
                let clone = graph.clone_once(id, actionables)?;
                if graph.get(id).is_some_and(|t| t.repeat_count == 0) {
                    self.pending.remove(index);
                }
                clone
            }
            _ => {
                self.pending.remove(index);
                id
            }
        };
        graph.mark_assigned(chosen, agent);
        debug!("assigned {chosen} to {agent}");
        Some(chosen)
    }

    /// Give an assigned task back: it returns to Pending at the back of
    /// the queue.
    pub fn requeue(&mut self, id: TaskId, graph: &mut TaskGraph) -> bool {
        if !graph.mark_unassigned(id) && graph.state(id) != Some(TaskState::Pending) {
            return false;
        }
        self.enqueue(id);
        true
    }

    /// Cancel a task wherever it is. Returns `None` for unknown or already
    /// terminal tasks.
    pub fn cancel(
        &mut self,
        id: TaskId,
        graph: &mut TaskGraph,
        actionables: &mut ActionableRegistry,
    ) -> Option<CancelOutcome> {
        let cancellation = graph.cancel(id, actionables)?;
        let was_queued = self.remove(id);
        for template in &cancellation.finished {
            self.remove(*template);
        }
        Some(CancelOutcome {
            was_queued,
            agent: cancellation.agent,
            finished: cancellation.finished,
        })
    }
}
