//! Scriptable in-memory backend for orchestrator-side tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use isorun_core::{JobId, RuntimeTask, SpawnMethod, SpawnerError, TaskId};

use crate::output::OutputFiles;
use crate::spawner::Spawner;

const METHODS: &[SpawnMethod] = &[SpawnMethod::StandaloneExecutable];

/// A [`Spawner`] whose liveness answers are scripted up front.
///
/// Each `is_task_alive` probe on a spawned task consumes the next scripted
/// answer; once the script is exhausted the task reads as dead. Useful for
/// exercising orchestrator polling logic without any real backend.
pub struct ScriptedSpawner {
    aliveness: Mutex<VecDeque<bool>>,
    spawn_succeeds: bool,
    spawn_count: AtomicUsize,
}

impl ScriptedSpawner {
    /// A spawner that spawns successfully and reads as immediately dead.
    pub fn new() -> Self {
        Self {
            aliveness: Mutex::new(VecDeque::new()),
            spawn_succeeds: true,
            spawn_count: AtomicUsize::new(0),
        }
    }

    /// Script the sequence of liveness answers.
    pub fn with_aliveness(self, answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            aliveness: Mutex::new(answers.into_iter().collect()),
            ..self
        }
    }

    /// Make every spawn attempt fail.
    pub fn with_failing_spawns(self) -> Self {
        Self {
            spawn_succeeds: false,
            ..self
        }
    }

    /// Number of spawn attempts made against this backend.
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Spawner for ScriptedSpawner {
    fn methods(&self) -> &[SpawnMethod] {
        METHODS
    }

    fn is_task_alive(&self, runtime_task: &mut RuntimeTask) -> Result<bool, SpawnerError> {
        if runtime_task.spawner_handle.is_none() {
            return Ok(false);
        }
        Ok(self.aliveness.lock().unwrap().pop_front().unwrap_or(false))
    }

    async fn spawn_task(&self, runtime_task: &mut RuntimeTask) -> bool {
        let attempt = self.spawn_count.fetch_add(1, Ordering::Relaxed);
        runtime_task.mark_spawning();
        if !self.spawn_succeeds {
            runtime_task.set_status("scripted spawn failure");
            runtime_task.mark_spawn_failed();
            return false;
        }
        runtime_task.mark_spawned(format!("scripted-{attempt}"));
        true
    }

    fn stream_output(
        &self,
        _job_id: &JobId,
        _task_id: &TaskId,
    ) -> Result<OutputFiles, SpawnerError> {
        Err(SpawnerError::Unsupported("stream_output"))
    }
}
