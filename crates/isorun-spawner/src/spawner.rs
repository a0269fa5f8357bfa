//! The contract every isolation backend implements.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use isorun_core::{JobId, RuntimeTask, SpawnMethod, SpawnerError, TaskId};

use crate::output::OutputFiles;

/// Interval between liveness probes while awaiting a task.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// A backend capable of launching, probing, and awaiting tasks in some
/// isolation context.
///
/// Implementations are shared by many concurrently-running attempts, so all
/// methods take `&self`; per-attempt state lives on the [`RuntimeTask`].
#[async_trait]
pub trait Spawner: Send + Sync {
    /// The spawn methods this backend supports. Never contains
    /// [`SpawnMethod::Any`].
    fn methods(&self) -> &[SpawnMethod];

    /// Whether a task requiring `method` can be handled by this backend.
    fn supports(&self, method: SpawnMethod) -> bool {
        method.satisfied_by(self.methods())
    }

    /// Probe whether the attempt is still running.
    ///
    /// Returns `Ok(false)` for a task that was never spawned. Ordinary
    /// "not running" conditions are never errors; `Err` is reserved for a
    /// backend that has become unusable (e.g. its native dependency
    /// disappeared), in which case an explanation is recorded on the
    /// RuntimeTask status first. Bounded-latency, possibly blocking.
    fn is_task_alive(&self, runtime_task: &mut RuntimeTask) -> Result<bool, SpawnerError>;

    /// Provision the isolated environment, deploy the task's entry point,
    /// and start execution.
    ///
    /// On success the backend handle is stored on the RuntimeTask and `true`
    /// is returned. Ordinary provisioning failures return `false` after
    /// logging a diagnostic; every failure path leaves a retry safe, reusing
    /// already-provisioned resources instead of erroring on them.
    async fn spawn_task(&self, runtime_task: &mut RuntimeTask) -> bool;

    /// Suspend until the task is no longer alive.
    ///
    /// Polls [`is_task_alive`](Self::is_task_alive) at [`PROBE_INTERVAL`]
    /// with a cooperative sleep; probes for one RuntimeTask are strictly
    /// sequential. No timeout is enforced here — callers needing a deadline
    /// cancel externally, which does not clean up backend resources.
    async fn wait_task(&self, runtime_task: &mut RuntimeTask) -> Result<(), SpawnerError> {
        loop {
            if !self.is_task_alive(runtime_task)? {
                runtime_task.mark_finished();
                return Ok(());
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    /// Validate that the task's declared requirements can be satisfied by
    /// this backend. With no requirements declared this trivially succeeds
    /// without contacting the backend.
    async fn check_task_requirements(&self, runtime_task: &RuntimeTask) -> bool {
        if !runtime_task.task.has_requirements() {
            return true;
        }
        debug!(
            task_id = %runtime_task.task.id,
            "backend declares no requirement validation, accepting"
        );
        true
    }

    /// Stream the output files a task produced, as (filename, bytes) pairs.
    ///
    /// Backends whose results are not locally reachable return
    /// [`SpawnerError::Unsupported`].
    fn stream_output(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
    ) -> Result<OutputFiles, SpawnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSpawner;
    use isorun_core::{AttemptState, Task, TaskId};

    fn runtime_task() -> RuntimeTask {
        RuntimeTask::new(Task::new(TaskId::new("t1"), vec!["noop".into()]))
    }

    #[tokio::test]
    async fn test_never_spawned_is_not_alive() {
        let spawner = ScriptedSpawner::new();
        let mut rt = runtime_task();
        assert!(!spawner.is_task_alive(&mut rt).unwrap());
        assert!(rt.status.is_none());
        assert_eq!(rt.state, AttemptState::Unspawned);
    }

    #[tokio::test]
    async fn test_wait_returns_only_when_dead() {
        let spawner = ScriptedSpawner::new().with_aliveness([true, true, false]);
        let mut rt = runtime_task();
        assert!(spawner.spawn_task(&mut rt).await);
        assert!(spawner.is_task_alive(&mut rt).unwrap());

        spawner.wait_task(&mut rt).await.unwrap();
        assert!(!spawner.is_task_alive(&mut rt).unwrap());
        assert_eq!(rt.state, AttemptState::Finished);
        assert!(rt.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_waits_do_not_deadlock() {
        let a = ScriptedSpawner::new().with_aliveness([true, true, true, false]);
        let b = ScriptedSpawner::new().with_aliveness([true, false]);
        let mut rt_a = runtime_task();
        let mut rt_b = runtime_task();
        assert!(a.spawn_task(&mut rt_a).await);
        assert!(b.spawn_task(&mut rt_b).await);

        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(
                async { a.wait_task(&mut rt_a).await.unwrap() },
                async { b.wait_task(&mut rt_b).await.unwrap() },
            )
        })
        .await
        .expect("concurrent waits deadlocked");

        assert_eq!(rt_a.state, AttemptState::Finished);
        assert_eq!(rt_b.state, AttemptState::Finished);
    }

    #[tokio::test]
    async fn test_requirement_check_trivially_succeeds_without_backend() {
        let spawner = ScriptedSpawner::new();
        let rt = runtime_task();
        assert!(spawner.check_task_requirements(&rt).await);
    }

    #[test]
    fn test_supports_matches_declared_subset() {
        let spawner = ScriptedSpawner::new();
        assert!(spawner.supports(SpawnMethod::StandaloneExecutable));
        assert!(spawner.supports(SpawnMethod::Any));
        assert!(!spawner.supports(SpawnMethod::InProcess));
    }
}
