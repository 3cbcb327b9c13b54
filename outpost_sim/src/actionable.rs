// Actionable targets: the external objects agents work on.
//
// Buildings under construction, ore deposits, storage depots and the like
// live outside this crate. The sim sees them only through `Actionable`: a
// position, whether they provide a resource, an association hook so the
// object knows which leaf task is aimed at it, and `perform_action`, which
// takes a slice of work and reports overall completion in [0, 1].
//
// `ActionableRegistry` owns the objects by `ActionableId` in a `BTreeMap`
// and resolves "nearest ore"-style targets. `WorkSite` is a generic
// implementation (accumulate work until a required amount) used by the
// headless runner and tests.
//
// See also: `task.rs` where leaf tasks reference actionables by id,
// `sim.rs` which drives `perform_action` once per tick.

use crate::types::{ActionKind, ActionableId, AgentId, LeafRef, ResourceKind};
use glam::{Vec2, Vec3};
use std::collections::{BTreeMap, BTreeSet};

/// An external object that agents perform actions on.
pub trait Actionable {
    /// Where agents stand to work on it.
    fn position(&self) -> Vec3;

    /// Whether a leaf targeting "nearest `resource`" may resolve to this.
    fn provides(&self, _resource: ResourceKind) -> bool {
        false
    }

    /// Apply `elapsed` units of work on behalf of `agent`. Returns overall
    /// completion; values >= 1.0 end the action.
    fn perform_action(
        &mut self,
        leaf: LeafRef,
        action: ActionKind,
        elapsed: f32,
        agent: AgentId,
    ) -> f32;

    /// A leaf task now targets this object.
    fn associate_task(&mut self, leaf: LeafRef);

    /// The leaf task no longer targets this object (finished or cancelled).
    fn clear_task(&mut self, leaf: LeafRef);
}

/// All actionables known to the sim, keyed by id.
#[derive(Default)]
pub struct ActionableRegistry {
    items: BTreeMap<ActionableId, Box<dyn Actionable>>,
    next_id: u64,
}

impl ActionableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, actionable: Box<dyn Actionable>) -> ActionableId {
        let id = ActionableId(self.next_id);
        self.next_id += 1;
        self.items.insert(id, actionable);
        id
    }

    pub fn get(&self, id: ActionableId) -> Option<&dyn Actionable> {
        self.items.get(&id).map(|a| a.as_ref())
    }

    pub fn get_mut(&mut self, id: ActionableId) -> Option<&mut (dyn Actionable + 'static)> {
        self.items.get_mut(&id).map(|a| a.as_mut())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Closest actionable providing `resource`, by planar distance. Ties go
    /// to the lower id.
    pub fn nearest_providing(
        &self,
        resource: ResourceKind,
        from: Vec3,
    ) -> Option<(ActionableId, Vec3)> {
        let origin = Vec2::new(from.x, from.z);
        self.items
            .iter()
            .filter(|(_, a)| a.provides(resource))
            .map(|(&id, a)| {
                let p = a.position();
                (id, p, origin.distance_squared(Vec2::new(p.x, p.z)))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)))
            .map(|(id, p, _)| (id, p))
    }

    /// No-op for unknown ids.
    pub fn associate(&mut self, id: ActionableId, leaf: LeafRef) {
        if let Some(a) = self.items.get_mut(&id) {
            a.associate_task(leaf);
        }
    }

    /// No-op for unknown ids.
    pub fn clear(&mut self, id: ActionableId, leaf: LeafRef) {
        if let Some(a) = self.items.get_mut(&id) {
            a.clear_task(leaf);
        }
    }
}

impl std::fmt::Debug for ActionableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionableRegistry")
            .field("ids", &self.items.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Generic work target: completion is accumulated work over required work.
#[derive(Clone, Debug)]
pub struct WorkSite {
    pub position: Vec3,
    pub work_required: f32,
    pub work_done: f32,
    pub resource: Option<ResourceKind>,
    pub associated: BTreeSet<LeafRef>,
    /// Whether finished work resets so the site can be worked again
    /// (deposits that yield load after load).
    pub renewable: bool,
}

impl WorkSite {
    pub fn new(position: Vec3, work_required: f32) -> Self {
        Self {
            position,
            work_required,
            work_done: 0.0,
            resource: None,
            associated: BTreeSet::new(),
            renewable: false,
        }
    }

    /// A renewable deposit of `resource`.
    pub fn deposit(position: Vec3, resource: ResourceKind, work_per_load: f32) -> Self {
        Self {
            resource: Some(resource),
            renewable: true,
            ..Self::new(position, work_per_load)
        }
    }

    pub fn completion(&self) -> f32 {
        if self.work_required <= 0.0 {
            1.0
        } else {
            (self.work_done / self.work_required).min(1.0)
        }
    }
}

impl Actionable for WorkSite {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn provides(&self, resource: ResourceKind) -> bool {
        self.resource == Some(resource)
    }

    fn perform_action(
        &mut self,
        _leaf: LeafRef,
        _action: ActionKind,
        elapsed: f32,
        _agent: AgentId,
    ) -> f32 {
        self.work_done += elapsed.max(0.0);
        let completion = self.completion();
        if completion >= 1.0 && self.renewable {
            self.work_done = 0.0;
        }
        completion
    }

    fn associate_task(&mut self, leaf: LeafRef) {
        self.associated.insert(leaf);
    }

    fn clear_task(&mut self, leaf: LeafRef) {
        self.associated.remove(&leaf);
    }
}
