// Error types.
//
// Runtime conditions in the sim (unreachable goals, out-of-bounds lookups,
// redundant task-graph notifications) are not errors: they are reported
// through return values or silently ignored. The types here cover the few
// genuine failures: loading a config and popping an empty priority queue.

use thiserror::Error;

/// Failure to load a `SimConfig` from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// `pop_min` on an empty `IndexedHeap`. Callers treat this as a contract
/// violation; the search loop never pops without checking.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("pop from an empty priority queue")]
pub struct EmptyQueueError;
