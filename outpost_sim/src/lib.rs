// outpost_sim: grid pathfinding and dependency-aware task scheduling for
// autonomous colony agents.
//
// This crate is the headless core of a colony game: agents pull composite
// tasks from a queue, walk to each leaf's target along A* paths over a
// penalty-weighted grid, and perform actions on external objects. Terrain
// generation, rendering, UI and the building/resource economy live
// elsewhere and talk to the core through `TerrainProvider` and
// `Actionable`.
//
// Module overview:
// - `sim.rs`:         Top-level `Sim`, tick loop, outside mutations.
// - `agent.rs`:       Agent data and its `Activity` state machine.
// - `scheduler.rs`:   `TaskQueue`: runnable-task selection, requeue, cancel.
// - `task.rs`:        `TaskGraph`: composite/leaf tasks, blockers, repeat templates.
// - `request.rs`:     `PathRequestManager`: per-agent resumable searches (rayon).
// - `pathfinding.rs`: Resumable A* over the grid (10/14 step costs).
// - `heap.rs`:        `IndexedHeap`: min-heap with keyed lookup and decrease-key.
// - `path.rs`:        Path simplification, turn boundaries, `PathFollower`.
// - `grid.rs`:        Walkability/penalty grid, box blur, regional rebuild, observers.
// - `terrain.rs`:     `TerrainProvider` trait + `HeightmapTerrain`.
// - `actionable.rs`:  `Actionable` trait, `ActionableRegistry`, `WorkSite`.
// - `event.rs`:       Narrative `SimEvent`s and `StepResult`.
// - `config.rs`:      `SimConfig`: every tunable, loaded from JSON.
// - `profile.rs`:     `AgentKind` + data-driven `AgentProfile`.
// - `error.rs`:       `ConfigError`, `EmptyQueueError`.
// - `types.rs`:       `CellCoord`, `Bounds`, entity ids, work enums.
//
// **Critical constraint: determinism.** The sim is a function of its
// inputs: no system time, no randomness, `BTreeMap`/`BTreeSet` for every
// collection that is iterated. Parallel search results are re-sorted by
// agent id before use.

pub mod actionable;
pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod grid;
pub mod heap;
pub mod path;
pub mod pathfinding;
pub mod profile;
pub mod request;
pub mod scheduler;
pub mod sim;
pub mod task;
pub mod terrain;
pub mod types;
