//! Task specification and runtime attempt types.

use crate::{AttemptState, SpawnMethod, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Task is the specification of one unit of work: what to run, with which
/// arguments, and under which environment requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Ordered command arguments handed to the backend's entry point.
    pub args: Vec<String>,

    /// Declared environment requirements. May be empty.
    pub requirements: HashMap<String, String>,

    /// The spawn method this task requires from a backend.
    pub method: SpawnMethod,
}

impl Task {
    /// Create a new Task with the given command arguments.
    pub fn new(id: TaskId, args: Vec<String>) -> Self {
        Self {
            id,
            args,
            requirements: HashMap::new(),
            method: SpawnMethod::Any,
        }
    }

    /// Builder method to add a requirement.
    pub fn with_requirement(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// Builder method to constrain the spawn method.
    pub fn with_method(mut self, method: SpawnMethod) -> Self {
        self.method = method;
        self
    }

    /// The ordered command arguments for this task.
    pub fn get_command_args(&self) -> Vec<String> {
        self.args.clone()
    }

    /// Whether this task declares any requirements.
    pub fn has_requirements(&self) -> bool {
        !self.requirements.is_empty()
    }
}

/// One in-flight execution attempt of a Task.
///
/// Created and owned by the orchestrator; mutated only by the spawner that
/// is actively handling it. `spawner_handle` is set exactly once, on a
/// successful spawn, and the attempt is discarded once `wait_task` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeTask {
    /// The underlying task specification.
    pub task: Task,

    /// Backend-defined opaque handle (e.g. a container id or a pid),
    /// unset until the task has been spawned.
    pub spawner_handle: Option<String>,

    /// Human-readable report of non-fatal backend conditions.
    pub status: Option<String>,

    /// Where this attempt is in its lifecycle.
    pub state: AttemptState,

    /// When the spawn succeeded.
    pub spawned_at: Option<DateTime<Utc>>,

    /// When the attempt was observed finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RuntimeTask {
    /// Create a fresh, unspawned attempt for a task.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            spawner_handle: None,
            status: None,
            state: AttemptState::Unspawned,
            spawned_at: None,
            finished_at: None,
        }
    }

    /// Record a human-readable backend condition.
    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    /// Mark the attempt as being provisioned.
    pub fn mark_spawning(&mut self) {
        self.state = AttemptState::Spawning;
    }

    /// Mark a successful spawn, storing the backend handle.
    pub fn mark_spawned(&mut self, handle: impl Into<String>) {
        self.spawner_handle = Some(handle.into());
        self.state = AttemptState::Alive;
        self.spawned_at = Some(Utc::now());
    }

    /// Mark a failed spawn. Terminal.
    pub fn mark_spawn_failed(&mut self) {
        self.state = AttemptState::SpawnFailed;
    }

    /// Mark the attempt finished. Terminal.
    pub fn mark_finished(&mut self) {
        self.state = AttemptState::Finished;
        self.finished_at = Some(Utc::now());
    }
}
