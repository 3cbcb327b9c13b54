// Data-driven simulation configuration.
//
// All tunable parameters live in `SimConfig`, loaded from JSON at startup.
// The sim never uses magic numbers for tunables; it reads the config. This
// keeps balance iteration out of the compile loop.
//
// Parameters are grouped into nested structs: `GridConfig` (dimensions and
// penalty smoothing), `SearchConfig` (per-tick A* budget),
// `SchedulerConfig` (idle polling and unreachable back-off), plus the
// per-kind agent table (`AgentProfile`, see `profile.rs`). Every group is
// `#[serde(default)]`, so a config file only needs the fields it changes.
//
// See also: `sim.rs` which owns the `SimConfig`, `grid.rs` which is built
// from `GridConfig`, `profile.rs` for agent profiles.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Identical configs give identical runs.

use crate::error::ConfigError;
use crate::profile::{AgentKind, AgentProfile, default_profiles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Shape and cost smoothing of the pathfinding grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of cells along world X.
    pub width: u32,
    /// Number of cells along world Z.
    pub height: u32,
    /// Edge length of one cell in world units.
    pub cell_size: f32,
    /// World-space (x, z) of the grid's minimum corner.
    pub origin: [f32; 2],
    /// Box-blur radius applied to the penalty field after every (re)build.
    /// Zero disables smoothing.
    pub blur_radius: u32,
    /// Penalty assigned to unwalkable cells before blurring, so walkable
    /// cells near obstacles become more expensive.
    pub obstacle_proximity_penalty: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            cell_size: 1.0,
            origin: [0.0, 0.0],
            blur_radius: 4,
            obstacle_proximity_penalty: 10,
        }
    }
}

/// A* budget per simulation tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum node expansions per in-flight search per tick. A search that
    /// runs out of budget resumes next tick.
    pub expansions_per_tick: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            expansions_per_tick: 4096,
        }
    }
}

/// Idle polling and failure back-off.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler polls of an idle agent.
    pub idle_poll_interval: f32,
    /// Seconds an agent waits after giving up an unreachable task.
    pub unreachable_backoff: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval: 0.1,
            unreachable_backoff: 1.0,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub grid: GridConfig,
    pub search: SearchConfig,
    pub scheduler: SchedulerConfig,
    /// Behavior table keyed by agent kind.
    pub agents: BTreeMap<AgentKind, AgentProfile>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            search: SearchConfig::default(),
            scheduler: SchedulerConfig::default(),
            agents: default_profiles(),
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Profile for an agent kind. Kinds missing from the table fall back to
    /// the built-in defaults.
    pub fn profile(&self, kind: AgentKind) -> AgentProfile {
        match self.agents.get(&kind) {
            Some(p) => p.clone(),
            None => default_profiles().remove(&kind).unwrap_or_else(|| AgentProfile {
                move_speed: 5.0,
                turn_speed: 8.0,
                turn_distance: 0.5,
                stopping_distance: 1.0,
                action_speeds: BTreeMap::new(),
                fallback_action_speed: 0.1,
            }),
        }
    }
}
