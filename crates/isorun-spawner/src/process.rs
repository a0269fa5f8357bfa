//! Bare-process backend: tasks run as ordinary child processes on the host.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use isorun_core::{
    JobId, JobResultsResolver, RuntimeTask, SpawnMethod, SpawnerError, TaskId,
};

use crate::output::{OutputCollector, OutputFiles};
use crate::spawner::Spawner;

const METHODS: &[SpawnMethod] = &[SpawnMethod::StandaloneExecutable];

/// Spawner that launches the task's command directly on the host.
///
/// The handle is the child's pid; liveness is a signal-0 probe. A detached
/// reaper collects the child's exit status so the pid does not linger as a
/// zombie and keep the probe reporting alive.
pub struct ProcessSpawner {
    collector: OutputCollector,
}

impl ProcessSpawner {
    /// Create a process spawner reading results through `resolver`.
    pub fn new(resolver: Arc<dyn JobResultsResolver>) -> Self {
        Self {
            collector: OutputCollector::new(resolver),
        }
    }
}

#[async_trait]
impl Spawner for ProcessSpawner {
    fn methods(&self) -> &[SpawnMethod] {
        METHODS
    }

    fn is_task_alive(&self, runtime_task: &mut RuntimeTask) -> Result<bool, SpawnerError> {
        let Some(handle) = runtime_task.spawner_handle.as_deref() else {
            return Ok(false);
        };
        let Ok(pid) = handle.parse::<i32>() else {
            return Ok(false);
        };
        // Signal 0 checks for existence without delivering anything.
        Ok(unsafe { libc::kill(pid, 0) } == 0)
    }

    async fn spawn_task(&self, runtime_task: &mut RuntimeTask) -> bool {
        runtime_task.mark_spawning();

        let args = runtime_task.task.get_command_args();
        let Some((program, rest)) = args.split_first() else {
            runtime_task.set_status("task has no command to execute");
            runtime_task.mark_spawn_failed();
            return false;
        };

        let mut child = match Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(task_id = %runtime_task.task.id, error = %e, "Failed to launch process");
                runtime_task.set_status(format!("failed to launch process: {e}"));
                runtime_task.mark_spawn_failed();
                return false;
            }
        };

        let Some(pid) = child.id() else {
            // The child exited before we could read its pid; there is no
            // handle to probe, so the attempt cannot be tracked.
            runtime_task.set_status("process exited before a handle could be taken");
            runtime_task.mark_spawn_failed();
            return false;
        };

        // Reap the child once it exits so the pid probe sees it gone.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        info!(task_id = %runtime_task.task.id, pid, "Process spawned");
        runtime_task.mark_spawned(pid.to_string());
        true
    }

    fn stream_output(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
    ) -> Result<OutputFiles, SpawnerError> {
        self.collector.stream(job_id, task_id)
    }
}
