// Agent profiles: data-driven per-kind agent behavior.
//
// All behavioral differences between agent kinds (plain workers, miners,
// builders, advanced builders) are expressed as data in `AgentProfile`,
// keyed by `AgentKind` in the sim config. The sim uses a single `Agent`
// type and reads kind-specific values from the profile table at runtime,
// so the scheduler and task graph never branch on a concrete agent type.
//
// See also: `config.rs` where the profile table lives, `agent.rs` for the
// `Agent` type that consumes this data.

use crate::types::ActionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The tagged variant of agent. Capabilities come from its `AgentProfile`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    Worker,
    Miner,
    Builder,
    AdvancedBuilder,
}

/// Data-driven behavioral parameters for an agent kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Movement speed in world units per second.
    pub move_speed: f32,

    /// How quickly the heading swings toward the next waypoint (per second).
    pub turn_speed: f32,

    /// Turn boundaries sit this far before each waypoint, so the agent
    /// starts turning early instead of overshooting corners.
    pub turn_distance: f32,

    /// Distance from the final waypoint at which the agent starts braking.
    /// Zero disables braking.
    pub stopping_distance: f32,

    /// Work rate per action kind, multiplied with elapsed time and handed to
    /// the actionable as its progress increment.
    pub action_speeds: BTreeMap<ActionKind, f32>,

    /// Work rate for actions missing from `action_speeds`.
    pub fallback_action_speed: f32,
}

impl AgentProfile {
    /// Work rate for the given action.
    pub fn speed_for(&self, action: ActionKind) -> f32 {
        self.action_speeds
            .get(&action)
            .copied()
            .unwrap_or(self.fallback_action_speed)
    }

    fn with_speeds(speeds: &[(ActionKind, f32)]) -> Self {
        Self {
            move_speed: 5.0,
            turn_speed: 8.0,
            turn_distance: 0.5,
            stopping_distance: 1.0,
            action_speeds: speeds.iter().copied().collect(),
            fallback_action_speed: 0.1,
        }
    }
}

/// Default profile table. Numbers mirror the hand-tuned unit roster.
pub fn default_profiles() -> BTreeMap<AgentKind, AgentProfile> {
    use ActionKind::*;
    let mut profiles = BTreeMap::new();
    profiles.insert(
        AgentKind::Worker,
        AgentProfile::with_speeds(&[
            (Build, 0.25),
            (Mine, 0.25),
            (PickUp, 1.0),
            (DropOff, 1.0),
            (FlattenPath, 0.25),
        ]),
    );
    profiles.insert(
        AgentKind::Miner,
        AgentProfile::with_speeds(&[(Mine, 1.0), (PickUp, 1.0), (DropOff, 1.0)]),
    );
    profiles.insert(
        AgentKind::Builder,
        AgentProfile::with_speeds(&[(Build, 1.0), (FlattenPath, 1.0)]),
    );
    profiles.insert(
        AgentKind::AdvancedBuilder,
        AgentProfile::with_speeds(&[
            (Mine, 0.3),
            (Build, 2.0),
            (FlattenPath, 1.0),
            (PickUp, 1.0),
            (DropOff, 1.0),
        ]),
    );
    profiles
}
