//! Spawn method declarations for tasks and backends.

use serde::{Deserialize, Serialize};

/// The method employed to spawn a task.
///
/// A backend declares the subset of methods it supports; a task declares the
/// one method it requires. The orchestrator must only hand a task to a
/// backend whose declared subset contains the task's method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpawnMethod {
    /// The backend holds a runnable object and invokes its run entry point
    /// directly, in-process.
    InProcess,
    /// The backend produces and runs an independent command/executable.
    StandaloneExecutable,
    /// No constraint. Only ever declared by a task, never by a backend.
    #[default]
    Any,
}

impl SpawnMethod {
    /// Whether a task requiring `self` can be handled by a backend declaring
    /// `declared`. `Any` matches every non-empty declaration set.
    pub fn satisfied_by(&self, declared: &[SpawnMethod]) -> bool {
        match self {
            Self::Any => !declared.is_empty(),
            method => declared.contains(method),
        }
    }
}
