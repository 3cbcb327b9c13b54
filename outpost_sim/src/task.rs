// Task graph: composite tasks, their leaves, and the dependency edges
// between them.
//
// A `CompositeTask` is the unit the scheduler hands to an agent: an ordered
// list of `LeafTask`s (go somewhere, do one action). Composite tasks form a
// graph through two kinds of edges:
//
// - **Blocking.** A task may name one blocker; it is not runnable until the
//   blocker finishes. The blocker keeps the inverse edge (`blocking`) so
//   finishing it unblocks dependents without scanning the graph.
// - **Repeat templates.** A task with `repeat_count > 0` is a template.
//   `clone_once` copies its leaves into a fresh child task and decrements
//   the count. When the last child finishes and the count is zero, the
//   template finishes too, which may in turn finish its own parent.
//
// Every graph operation tolerates redundant or stale calls: finishing a
// finished task, cancelling twice, unblocking with the wrong blocker, or
// naming an unknown id are all silent no-ops. The graph also keeps the
// leaf/actionable associations in sync (associate on create/clone, clear
// on finish/cancel).
//
// Cancellation does not cascade: tasks blocked by a cancelled task stay
// blocked until something else resolves them. Cancelling a clone still
// counts against its template, so an exhausted template whose last live
// clone is cancelled finishes and releases its own dependents.
//
// See also: `scheduler.rs` for the queue that selects runnable tasks,
// `sim.rs` for the agent-side execution of leaves, `actionable.rs` for the
// objects leaves point at.
//
// **Critical constraint: determinism.** Tasks live in a `BTreeMap` keyed by
// monotonic `TaskId`s; children are a `BTreeSet`.

use crate::actionable::ActionableRegistry;
use crate::types::{ActionKind, ActionableId, AgentId, LeafRef, ResourceKind, TaskCategory, TaskId};
use glam::Vec3;
use log::debug;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Predicate gating whether a leaf (and so its whole task) may start.
pub type StartCondition = Arc<dyn Fn() -> bool + Send + Sync>;

/// Where a leaf sends its agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TaskTarget {
    Position(Vec3),
    /// Resolved to the nearest actionable providing the resource when the
    /// path is requested.
    Nearest(ResourceKind),
}

/// One move-and-act step.
#[derive(Clone)]
pub struct LeafTask {
    pub description: String,
    pub target: TaskTarget,
    pub action: ActionKind,
    pub actionable: Option<ActionableId>,
    pub start_condition: Option<StartCondition>,
}

impl LeafTask {
    pub fn new(description: impl Into<String>, target: TaskTarget, action: ActionKind) -> Self {
        Self {
            description: description.into(),
            target,
            action,
            actionable: None,
            start_condition: None,
        }
    }

    pub fn with_actionable(mut self, id: ActionableId) -> Self {
        self.actionable = Some(id);
        self
    }

    pub fn with_start_condition(
        mut self,
        condition: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.start_condition = Some(Arc::new(condition));
        self
    }

    /// True when there is no precondition or it currently holds.
    pub fn can_start(&self) -> bool {
        self.start_condition.as_ref().is_none_or(|c| c())
    }
}

impl fmt::Debug for LeafTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafTask")
            .field("description", &self.description)
            .field("target", &self.target)
            .field("action", &self.action)
            .field("actionable", &self.actionable)
            .field("has_start_condition", &self.start_condition.is_some())
            .finish()
    }
}

/// Lifecycle state of a composite task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the queue (blocked or not).
    Pending,
    /// Held by exactly one agent.
    Assigned,
    Finished,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

/// A dispatchable bundle of leaves.
#[derive(Clone, Debug)]
pub struct CompositeTask {
    pub id: TaskId,
    pub category: TaskCategory,
    pub description: String,
    pub leaves: Vec<LeafTask>,
    /// At most one task that must finish before this one may run.
    pub blocker: Option<TaskId>,
    /// Inverse of `blocker`: tasks waiting on this one.
    pub blocking: SmallVec<[TaskId; 2]>,
    /// Clones this template may still spawn.
    pub repeat_count: u32,
    /// Live clones spawned from this template.
    pub children: BTreeSet<TaskId>,
    /// The template this task was cloned from.
    pub parent: Option<TaskId>,
    pub state: TaskState,
    pub assigned_agent: Option<AgentId>,
}

impl CompositeTask {
    pub fn is_template(&self) -> bool {
        self.repeat_count > 0
    }

    fn leaf_refs(&self) -> impl Iterator<Item = (LeafRef, ActionableId)> + '_ {
        let task = self.id;
        self.leaves
            .iter()
            .enumerate()
            .filter_map(move |(index, leaf)| leaf.actionable.map(|a| (LeafRef { task, index }, a)))
    }
}

/// Everything a producer supplies to create a composite task.
#[derive(Clone, Debug)]
pub struct NewTask {
    pub category: TaskCategory,
    pub description: String,
    pub leaves: Vec<LeafTask>,
    pub blocker: Option<TaskId>,
    pub repeat_count: u32,
}

impl NewTask {
    pub fn new(
        category: TaskCategory,
        description: impl Into<String>,
        leaves: Vec<LeafTask>,
    ) -> Self {
        Self {
            category,
            description: description.into(),
            leaves,
            blocker: None,
            repeat_count: 0,
        }
    }

    pub fn blocked_by(mut self, blocker: TaskId) -> Self {
        self.blocker = Some(blocker);
        self
    }

    pub fn repeat(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }
}

/// Result of `TaskGraph::cancel`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cancellation {
    /// The agent that held the task, if it was assigned.
    pub agent: Option<AgentId>,
    /// Parent templates finished by the cancel, in propagation order.
    pub finished: Vec<TaskId>,
}

/// Owner of every composite task.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, CompositeTask>,
    next_id: u64,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&CompositeTask> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut CompositeTask> {
        self.tasks.get_mut(&id)
    }

    pub fn leaf(&self, leaf: LeafRef) -> Option<&LeafTask> {
        self.tasks.get(&leaf.task)?.leaves.get(leaf.index)
    }

    pub fn leaf_mut(&mut self, leaf: LeafRef) -> Option<&mut LeafTask> {
        self.tasks.get_mut(&leaf.task)?.leaves.get_mut(leaf.index)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|t| t.state)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompositeTask> {
        self.tasks.values()
    }

    /// Insert a new pending task and associate its leaves with their
    /// actionables. A blocker that is unknown or already finished is
    /// dropped; a cancelled blocker is kept and blocks indefinitely.
    pub fn create(&mut self, new: NewTask, actionables: &mut ActionableRegistry) -> TaskId {
        let id = self.allocate_id();
        let blocker = new.blocker.filter(|b| {
            self.tasks
                .get(b)
                .is_some_and(|t| t.state != TaskState::Finished)
        });
        if let Some(blocking_task) = blocker.and_then(|b| self.tasks.get_mut(&b)) {
            blocking_task.blocking.push(id);
        }
        let task = CompositeTask {
            id,
            category: new.category,
            description: new.description,
            leaves: new.leaves,
            blocker,
            blocking: SmallVec::new(),
            repeat_count: new.repeat_count,
            children: BTreeSet::new(),
            parent: None,
            state: TaskState::Pending,
            assigned_agent: None,
        };
        for (leaf, actionable) in task.leaf_refs() {
            actionables.associate(actionable, leaf);
        }
        debug!(
            "created {id} '{}' blocker={blocker:?} repeat={}",
            task.description, task.repeat_count
        );
        self.tasks.insert(id, task);
        id
    }

    /// Spawn one child copy of a template. The copy has fresh identity, the
    /// same leaves, no blocker and no repeat count of its own. Returns
    /// `None` once the template is exhausted (or is not a live template).
    pub fn clone_once(
        &mut self,
        template: TaskId,
        actionables: &mut ActionableRegistry,
    ) -> Option<TaskId> {
        let parent = self.tasks.get(&template)?;
        if parent.repeat_count == 0 || parent.state.is_terminal() {
            return None;
        }
        let category = parent.category;
        let description = parent.description.clone();
        let leaves = parent.leaves.clone();

        let id = self.allocate_id();
        let clone = CompositeTask {
            id,
            category,
            description,
            leaves,
            blocker: None,
            blocking: SmallVec::new(),
            repeat_count: 0,
            children: BTreeSet::new(),
            parent: Some(template),
            state: TaskState::Pending,
            assigned_agent: None,
        };
        for (leaf, actionable) in clone.leaf_refs() {
            actionables.associate(actionable, leaf);
        }
        self.tasks.insert(id, clone);

        let parent = self.tasks.get_mut(&template)?;
        parent.repeat_count -= 1;
        parent.children.insert(id);
        debug!("cloned {template} -> {id}, {} repeats left", parent.repeat_count);
        Some(id)
    }

    /// Runnable means pending, unblocked, and every leaf's start condition
    /// holds.
    pub fn satisfies_start_requirements(&self, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|t| {
            t.state == TaskState::Pending
                && t.blocker.is_none()
                && t.leaves.iter().all(LeafTask::can_start)
        })
    }

    /// Pending -> Assigned. Returns false unless the task was pending.
    pub fn mark_assigned(&mut self, id: TaskId, agent: AgentId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(t) if t.state == TaskState::Pending => {
                t.state = TaskState::Assigned;
                t.assigned_agent = Some(agent);
                true
            }
            _ => false,
        }
    }

    /// Assigned -> Pending, used when an agent gives a task back.
    pub fn mark_unassigned(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(t) if t.state == TaskState::Assigned => {
                t.state = TaskState::Pending;
                t.assigned_agent = None;
                true
            }
            _ => false,
        }
    }

    /// Clear `blocker` from `id` if it is the recorded blocker.
    pub fn unblock(&mut self, id: TaskId, blocker: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(t) if t.blocker == Some(blocker) => {
                t.blocker = None;
                debug!("{id} unblocked by {blocker}");
                true
            }
            _ => false,
        }
    }

    /// Finish a task and propagate: unblock its dependents, clear its
    /// associations, and notify its parent template, which may finish in
    /// turn. Returns every task finished by this call in order (empty if
    /// the task was unknown or already terminal).
    pub fn mark_finished(
        &mut self,
        id: TaskId,
        actionables: &mut ActionableRegistry,
    ) -> Vec<TaskId> {
        let mut finished = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next.take() {
            let Some(task) = self.tasks.get_mut(&current) else {
                break;
            };
            if task.state.is_terminal() {
                break;
            }
            task.state = TaskState::Finished;
            task.assigned_agent = None;
            let dependents = std::mem::take(&mut task.blocking);
            let parent = task.parent;
            for (leaf, actionable) in task.leaf_refs() {
                actionables.clear(actionable, leaf);
            }
            debug!("finished {current}");
            finished.push(current);

            for dependent in dependents {
                self.unblock(dependent, current);
            }
            if let Some(parent) = parent {
                next = self.mark_child_finished(parent, current).then_some(parent);
            }
        }
        finished
    }

    /// Drop `child` from the template's live set. Returns true when the
    /// template should now finish (no live children and no repeats left).
    fn mark_child_finished(&mut self, parent: TaskId, child: TaskId) -> bool {
        let Some(template) = self.tasks.get_mut(&parent) else {
            return false;
        };
        if !template.children.remove(&child) {
            return false;
        }
        !template.state.is_terminal() && template.children.is_empty() && template.repeat_count == 0
    }

    /// Cancel a pending or assigned task: clear associations, drop its
    /// leaves, and detach it from its parent. Tasks it blocks stay blocked.
    /// A template whose last live clone this was, with no repeats left,
    /// finishes as if that clone had. Returns `None` when the task was
    /// unknown or already terminal.
    pub fn cancel(
        &mut self,
        id: TaskId,
        actionables: &mut ActionableRegistry,
    ) -> Option<Cancellation> {
        let task = self.tasks.get_mut(&id)?;
        if task.state.is_terminal() {
            return None;
        }
        for (leaf, actionable) in task.leaf_refs() {
            actionables.clear(actionable, leaf);
        }
        let agent = task.assigned_agent.take();
        task.state = TaskState::Cancelled;
        task.leaves.clear();
        let parent = task.parent;
        if !task.blocking.is_empty() {
            debug!("cancelled {id} leaves {} dependents blocked", task.blocking.len());
        }
        debug!("cancelled {id}");

        let mut finished = Vec::new();
        if let Some(parent) = parent {
            if self.mark_child_finished(parent, id) {
                debug!("{parent} has no clones or repeats left after cancelling {id}");
                finished = self.mark_finished(parent, actionables);
            }
        }
        Some(Cancellation { agent, finished })
    }

    /// Forget finished and cancelled tasks nothing still refers to as a
    /// blocker or parent.
    pub fn prune_terminal(&mut self) -> usize {
        let referenced: BTreeSet<TaskId> = self
            .tasks
            .values()
            .filter(|t| !t.state.is_terminal())
            .flat_map(|t| t.blocker.into_iter().chain(t.parent))
            .collect();
        let before = self.tasks.len();
        self.tasks
            .retain(|id, t| !t.state.is_terminal() || referenced.contains(id));
        before - self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actionable::Actionable;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn leaf(action: ActionKind) -> LeafTask {
        LeafTask::new("step", TaskTarget::Position(Vec3::new(1.0, 0.0, 1.0)), action)
    }

    fn simple(description: &str) -> NewTask {
        NewTask::new(TaskCategory::Move, description, vec![leaf(ActionKind::Build)])
    }

    #[test]
    fn ids_are_monotonic() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b"), &mut reg);
        assert!(a < b);
        assert_eq!(graph.state(a), Some(TaskState::Pending));
    }

    #[test]
    fn blocked_task_is_not_runnable_until_blocker_finishes() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        assert_eq!(graph.get(a).unwrap().blocking.as_slice(), &[b]);
        assert!(!graph.satisfies_start_requirements(b));

        assert_eq!(graph.mark_finished(a, &mut reg), vec![a]);
        assert!(graph.satisfies_start_requirements(b));
        assert!(graph.get(a).unwrap().blocking.is_empty());
    }

    #[test]
    fn one_blocker_can_hold_several_dependents() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        let c = graph.create(simple("c").blocked_by(a), &mut reg);
        graph.mark_finished(a, &mut reg);
        assert!(graph.satisfies_start_requirements(b));
        assert!(graph.satisfies_start_requirements(c));
    }

    #[test]
    fn finished_blocker_is_ignored_at_creation() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        graph.mark_finished(a, &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        assert_eq!(graph.get(b).unwrap().blocker, None);
        let c = graph.create(simple("c").blocked_by(TaskId(999)), &mut reg);
        assert_eq!(graph.get(c).unwrap().blocker, None);
    }

    #[test]
    fn redundant_notifications_are_no_ops() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        // Wrong blocker identity.
        assert!(!graph.unblock(b, TaskId(42)));
        assert_eq!(graph.get(b).unwrap().blocker, Some(a));

        assert_eq!(graph.mark_finished(a, &mut reg), vec![a]);
        assert!(graph.mark_finished(a, &mut reg).is_empty());
        assert!(graph.mark_finished(TaskId(999), &mut reg).is_empty());
        assert!(!graph.unblock(b, a));
    }

    #[test]
    fn clone_once_spawns_exactly_k_children() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let template = graph.create(simple("mine ore").repeat(3), &mut reg);

        let clones: Vec<_> = (0..5).filter_map(|_| graph.clone_once(template, &mut reg)).collect();
        assert_eq!(clones.len(), 3);
        let t = graph.get(template).unwrap();
        assert_eq!(t.repeat_count, 0);
        assert_eq!(t.children.len(), 3);
        for c in &clones {
            let clone = graph.get(*c).unwrap();
            assert_eq!(clone.parent, Some(template));
            assert_eq!(clone.leaves.len(), 1);
            assert_eq!(clone.leaves[0].action, ActionKind::Build);
            assert_eq!(clone.repeat_count, 0);
        }
    }

    #[test]
    fn finishing_all_clones_finishes_template_and_its_parent_chain() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let outer = graph.create(simple("outer").repeat(1), &mut reg);
        let inner = graph.clone_once(outer, &mut reg).unwrap();
        // Make the clone a template in its own right.
        graph.get_mut(inner).unwrap().repeat_count = 2;
        let c1 = graph.clone_once(inner, &mut reg).unwrap();
        let c2 = graph.clone_once(inner, &mut reg).unwrap();

        assert_eq!(graph.mark_finished(c1, &mut reg), vec![c1]);
        assert_eq!(graph.state(inner), Some(TaskState::Pending));
        assert_eq!(graph.mark_finished(c2, &mut reg), vec![c2, inner, outer]);
        assert_eq!(graph.state(outer), Some(TaskState::Finished));
    }

    #[test]
    fn template_with_repeats_left_does_not_finish() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let template = graph.create(simple("t").repeat(2), &mut reg);
        let c1 = graph.clone_once(template, &mut reg).unwrap();
        graph.mark_finished(c1, &mut reg);
        assert_eq!(graph.state(template), Some(TaskState::Pending));
    }

    #[test]
    fn start_condition_gates_runnability() {
        let flag = Arc::new(AtomicBool::new(false));
        let probe = Arc::clone(&flag);
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let gated =
            leaf(ActionKind::DropOff).with_start_condition(move || probe.load(Ordering::SeqCst));
        let id = graph.create(
            NewTask::new(
                TaskCategory::Build,
                "gated",
                vec![leaf(ActionKind::PickUp), gated],
            ),
            &mut reg,
        );
        assert!(!graph.satisfies_start_requirements(id));
        flag.store(true, Ordering::SeqCst);
        assert!(graph.satisfies_start_requirements(id));
    }

    /// Records association calls so tests can see what the graph did.
    struct Spy {
        live: Rc<RefCell<BTreeSet<LeafRef>>>,
    }

    impl Actionable for Spy {
        fn position(&self) -> Vec3 {
            Vec3::ZERO
        }
        fn perform_action(&mut self, _: LeafRef, _: ActionKind, _: f32, _: AgentId) -> f32 {
            1.0
        }
        fn associate_task(&mut self, leaf: LeafRef) {
            self.live.borrow_mut().insert(leaf);
        }
        fn clear_task(&mut self, leaf: LeafRef) {
            self.live.borrow_mut().remove(&leaf);
        }
    }

    fn spy(reg: &mut ActionableRegistry) -> (ActionableId, Rc<RefCell<BTreeSet<LeafRef>>>) {
        let live = Rc::new(RefCell::new(BTreeSet::new()));
        let id = reg.insert(Box::new(Spy { live: Rc::clone(&live) }));
        (id, live)
    }

    #[test]
    fn associations_follow_task_lifecycle() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let (site, live) = spy(&mut reg);
        let id = graph.create(
            NewTask::new(
                TaskCategory::Build,
                "build",
                vec![leaf(ActionKind::PickUp), leaf(ActionKind::Build).with_actionable(site)],
            ),
            &mut reg,
        );
        assert_eq!(
            live.borrow().iter().copied().collect::<Vec<_>>(),
            vec![LeafRef { task: id, index: 1 }]
        );
        graph.mark_finished(id, &mut reg);
        assert!(live.borrow().is_empty());
    }

    #[test]
    fn clones_get_their_own_associations() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let (site, live) = spy(&mut reg);
        let template = graph.create(
            NewTask::new(
                TaskCategory::Mine,
                "mine",
                vec![leaf(ActionKind::Mine).with_actionable(site)],
            )
            .repeat(2),
            &mut reg,
        );
        let clone = graph.clone_once(template, &mut reg).unwrap();
        assert!(live.borrow().contains(&LeafRef { task: clone, index: 0 }));
        graph.mark_finished(clone, &mut reg);
        assert!(!live.borrow().contains(&LeafRef { task: clone, index: 0 }));
        assert!(live.borrow().contains(&LeafRef { task: template, index: 0 }));
    }

    #[test]
    fn cancel_clears_associations() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let (site, live) = spy(&mut reg);
        let id = graph.create(
            NewTask::new(
                TaskCategory::Build,
                "build",
                vec![leaf(ActionKind::Build).with_actionable(site)],
            ),
            &mut reg,
        );
        graph.mark_assigned(id, AgentId(0));
        assert_eq!(live.borrow().len(), 1);
        graph.cancel(id, &mut reg);
        assert!(live.borrow().is_empty());
    }

    #[test]
    fn cancelling_last_clone_finishes_exhausted_template() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let template = graph.create(simple("t").repeat(1), &mut reg);
        let after = graph.create(simple("after").blocked_by(template), &mut reg);
        let clone = graph.clone_once(template, &mut reg).unwrap();
        assert!(graph.mark_assigned(clone, AgentId(3)));

        let cancellation = graph.cancel(clone, &mut reg).unwrap();
        assert_eq!(cancellation.agent, Some(AgentId(3)));
        assert_eq!(cancellation.finished, vec![template]);
        let t = graph.get(template).unwrap();
        assert!(t.children.is_empty());
        assert_eq!(t.state, TaskState::Finished);
        assert!(graph.satisfies_start_requirements(after));

        let c = graph.get(clone).unwrap();
        assert_eq!(c.state, TaskState::Cancelled);
        assert!(c.leaves.is_empty());
        assert_eq!(graph.cancel(clone, &mut reg), None);
    }

    #[test]
    fn cancelling_clone_with_repeats_left_keeps_template_pending() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let template = graph.create(simple("t").repeat(2), &mut reg);
        let first = graph.clone_once(template, &mut reg).unwrap();

        let cancellation = graph.cancel(first, &mut reg).unwrap();
        assert!(cancellation.finished.is_empty());
        assert_eq!(graph.state(template), Some(TaskState::Pending));

        // The remaining repeat still completes the template normally.
        let second = graph.clone_once(template, &mut reg).unwrap();
        assert_eq!(graph.mark_finished(second, &mut reg), vec![second, template]);
    }

    #[test]
    fn cancelling_one_of_two_live_clones_waits_for_the_other() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let template = graph.create(simple("t").repeat(2), &mut reg);
        let c1 = graph.clone_once(template, &mut reg).unwrap();
        let c2 = graph.clone_once(template, &mut reg).unwrap();

        assert!(graph.cancel(c1, &mut reg).unwrap().finished.is_empty());
        assert_eq!(graph.state(template), Some(TaskState::Pending));
        assert_eq!(graph.cancel(c2, &mut reg).unwrap().finished, vec![template]);
    }

    #[test]
    fn cancel_leaves_dependents_blocked() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        assert_eq!(
            graph.cancel(a, &mut reg),
            Some(Cancellation {
                agent: None,
                finished: Vec::new()
            })
        );
        assert!(!graph.satisfies_start_requirements(b));
        assert!(graph.mark_finished(a, &mut reg).is_empty());
    }

    #[test]
    fn assign_and_unassign_round_trip() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        assert!(graph.mark_assigned(a, AgentId(1)));
        assert!(!graph.mark_assigned(a, AgentId(2)));
        assert!(!graph.satisfies_start_requirements(a));
        assert!(graph.mark_unassigned(a));
        assert_eq!(graph.get(a).unwrap().assigned_agent, None);
        assert!(graph.satisfies_start_requirements(a));
    }

    #[test]
    fn prune_keeps_referenced_terminal_tasks() {
        let mut graph = TaskGraph::new();
        let mut reg = ActionableRegistry::new();
        let a = graph.create(simple("a"), &mut reg);
        let b = graph.create(simple("b").blocked_by(a), &mut reg);
        let c = graph.create(simple("c"), &mut reg);
        graph.cancel(a, &mut reg);
        graph.mark_finished(c, &mut reg);
        assert_eq!(graph.prune_terminal(), 1);
        assert!(graph.get(a).is_some());
        assert!(graph.get(b).is_some());
        assert!(graph.get(c).is_none());
    }
}
