//! LXC container backend.
//!
//! One task attempt gets one container: the spawner provisions a rootfs,
//! deploys the task runner entry point into it, starts the container, waits
//! for network readiness, and executes the entry point inside the
//! container's namespace. The native LXC operations are reached through the
//! [`ContainerRuntime`] capability injected at construction, so tests can
//! script a runtime and a missing native dependency is an ordinary value,
//! not process-global state.

use std::collections::HashMap;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use isorun_core::{
    JobId, JobResultsResolver, RuntimeTask, Settings, SpawnMethod, SpawnerError, Task, TaskId,
};

use crate::output::{OutputCollector, OutputFiles};
use crate::spawner::Spawner;
use crate::streams::TemporaryStreamCapture;

/// Fixed in-container path of the task runner entry point.
pub const ENTRY_POINT: &str = "/root/isorun-runner";

/// Leading sub-command handed to the runner.
const ENTRY_SUBCOMMAND: &str = "task-run";

/// Process name the liveness probe pattern-matches inside the container.
const RUNNER_PROCESS: &str = "isorun-runner";

/// Bound on the wait for container network connectivity.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

const METHODS: &[SpawnMethod] = &[SpawnMethod::StandaloneExecutable];

/// Container image coordinates resolved from the settings registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub dist: String,
    pub release: String,
    pub arch: String,
}

/// Outcome of a command executed inside a container.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// What to do with the container once the entry point has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// Leave the container defined and running. The default: completed
    /// containers stay around for inspection and possible reuse.
    #[default]
    KeepRunning,
    /// Stop and destroy the container. Teardown failures are logged and
    /// never fail the spawn.
    Destroy,
}

/// The narrow capability surface a container implementation must provide.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the native dependency is usable at all.
    fn available(&self) -> bool;

    /// Name of the native dependency, for diagnostics.
    fn dependency_name(&self) -> &str;

    fn is_defined(&self, id: &str) -> bool;

    fn is_running(&self, id: &str) -> bool;

    /// Human-readable container state, if queryable.
    fn state(&self, id: &str) -> Option<String>;

    /// Pid of the container's init process once running.
    fn init_pid(&self, id: &str) -> Option<i32>;

    /// Host path of the container's root filesystem.
    fn rootfs_path(&self, id: &str) -> Option<PathBuf>;

    /// Provision the container's root filesystem. False on failure.
    async fn create_rootfs(&self, id: &str, image: &ContainerImage) -> bool;

    /// Start the container. False on failure.
    async fn start(&self, id: &str) -> bool;

    /// Block (cooperatively) until the container has network connectivity,
    /// bounded by `timeout`.
    async fn wait_network(&self, id: &str, timeout: Duration) -> bool;

    /// Execute a command inside the container, capturing its standard
    /// streams; suspends only on the child's exit status.
    async fn attach(&self, id: &str, argv: &[String]) -> io::Result<CommandOutcome>;

    /// Run a short command inside the container and report its exit code.
    /// Blocking by design; bounded latency.
    fn probe(&self, id: &str, argv: &[String]) -> io::Result<i32>;

    /// Stop the container. False on failure.
    async fn stop(&self, id: &str) -> bool;

    /// Destroy the container and its rootfs. False on failure.
    async fn destroy(&self, id: &str) -> bool;
}

/// Spawner that runs each task attempt inside its own LXC container.
pub struct LxcSpawner {
    runtime: Arc<dyn ContainerRuntime>,
    settings: Settings,
    runner_source: PathBuf,
    teardown: TeardownPolicy,
    collector: OutputCollector,
    // One container per task; a retry of the same task reuses its
    // already-provisioned container instead of erroring on it.
    container_ids: Mutex<HashMap<TaskId, String>>,
}

impl LxcSpawner {
    /// Settings section holding this backend's options.
    pub const SECTION: &'static str = "spawner.lxc";

    /// Declare this backend's options and defaults on a settings registry.
    pub fn register_options(settings: &mut Settings) {
        settings.register_option(
            Self::SECTION,
            "dist",
            "Distro for the LXC container",
            "fedora",
        );
        settings.register_option(
            Self::SECTION,
            "release",
            "Release of the LXC container (depends on the choice of distro)",
            "32",
        );
        settings.register_option(
            Self::SECTION,
            "arch",
            "Architecture of the LXC container",
            "i386",
        );
    }

    /// Create an LXC spawner.
    ///
    /// `runner_source` is the host path of the task runner executable to
    /// deploy into each container at [`ENTRY_POINT`].
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        settings: Settings,
        runner_source: impl Into<PathBuf>,
        resolver: Arc<dyn JobResultsResolver>,
    ) -> Self {
        Self {
            runtime,
            settings,
            runner_source: runner_source.into(),
            teardown: TeardownPolicy::default(),
            collector: OutputCollector::new(resolver),
            container_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Builder method to set the teardown policy.
    pub fn with_teardown(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Entry-point invocation: runner path, sub-command, then the task's
    /// own arguments.
    fn entry_point_args(task: &Task) -> Vec<String> {
        let mut argv = task.get_command_args();
        argv.insert(0, ENTRY_SUBCOMMAND.to_string());
        argv.insert(0, ENTRY_POINT.to_string());
        argv
    }

    fn image_from_settings(&self) -> ContainerImage {
        let config = self.settings.as_dict();
        let lookup = |key: &str, fallback: &str| {
            config
                .get(&format!("{}.{}", Self::SECTION, key))
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };
        ContainerImage {
            dist: lookup("dist", "fedora"),
            release: lookup("release", "32"),
            arch: lookup("arch", "i386"),
        }
    }

    /// Container id for a task: allocated unique on first use, stable for
    /// retries of the same task.
    fn container_id_for(&self, task_id: &TaskId) -> String {
        let mut ids = self.container_ids.lock().unwrap();
        ids.entry(task_id.clone())
            .or_insert_with(|| {
                let suffix = Uuid::new_v4().simple().to_string();
                format!("isorun-{}", &suffix[..12])
            })
            .clone()
    }

    /// Copy the runner into the rootfs at the entry path, r-x for all.
    /// Redeployment over an earlier (read-only) copy must not fail.
    fn deploy_runner(&self, rootfs: &Path) -> io::Result<()> {
        let destination = rootfs.join(ENTRY_POINT.trim_start_matches('/'));
        match std::fs::remove_file(&destination) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::copy(&self.runner_source, &destination)?;
        std::fs::set_permissions(&destination, std::fs::Permissions::from_mode(0o555))?;
        Ok(())
    }

    async fn apply_teardown(&self, container_id: &str) {
        if self.teardown != TeardownPolicy::Destroy {
            return;
        }
        if !self.runtime.stop(container_id).await {
            warn!(container = %container_id, "Failed to stop the container");
            return;
        }
        if !self.runtime.destroy(container_id).await {
            warn!(container = %container_id, "Failed to destroy the container");
        }
    }
}

#[async_trait]
impl Spawner for LxcSpawner {
    fn methods(&self) -> &[SpawnMethod] {
        METHODS
    }

    fn is_task_alive(&self, runtime_task: &mut RuntimeTask) -> Result<bool, SpawnerError> {
        let Some(container_id) = runtime_task.spawner_handle.clone() else {
            return Ok(false);
        };

        if !self.runtime.available() {
            // A handle implies the dependency was present at spawn time; an
            // absence now means the environment is corrupted.
            let msg = format!("{} not available on the system", self.runtime.dependency_name());
            runtime_task.set_status(msg.clone());
            return Err(SpawnerError::MissingDependency(msg));
        }

        if !self.runtime.is_defined(&container_id) || !self.runtime.is_running(&container_id) {
            return Ok(false);
        }

        let argv = ["pgrep", "-f", RUNNER_PROCESS].map(String::from);
        let exit_code = self.runtime.probe(&container_id, &argv)?;
        Ok(exit_code == 0)
    }

    async fn spawn_task(&self, runtime_task: &mut RuntimeTask) -> bool {
        runtime_task.mark_spawning();

        let entry_point_args = Self::entry_point_args(&runtime_task.task);
        let image = self.image_from_settings();

        if !self.runtime.available() {
            let msg = format!("{} not available on the system", self.runtime.dependency_name());
            warn!(task_id = %runtime_task.task.id, "{}", msg);
            runtime_task.set_status(msg);
            runtime_task.mark_spawn_failed();
            return false;
        }

        let container_id = self.container_id_for(&runtime_task.task.id);

        if !self.runtime.is_defined(&container_id) {
            if !self.runtime.create_rootfs(&container_id, &image).await {
                error!(container = %container_id, "Failed to create the container rootfs");
                runtime_task.mark_spawn_failed();
                return false;
            }
        }

        // Deploy the task runner into the container.
        let Some(rootfs) = self.runtime.rootfs_path(&container_id) else {
            warn!(container = %container_id, "Container has no rootfs path");
            runtime_task.mark_spawn_failed();
            return false;
        };
        if let Err(e) = self.deploy_runner(&rootfs) {
            warn!(container = %container_id, error = %e, "Failed to deploy the task runner");
            runtime_task.mark_spawn_failed();
            return false;
        }

        if !self.runtime.is_running(&container_id) {
            if !self.runtime.start(&container_id).await {
                error!(container = %container_id, "Failed to start the container");
                runtime_task.mark_spawn_failed();
                return false;
            }
        }

        if !self.runtime.wait_network(&container_id, NETWORK_TIMEOUT).await {
            error!(container = %container_id, "Failed to connect to the container");
            runtime_task.mark_spawn_failed();
            return false;
        }

        info!(
            container = %container_id,
            state = ?self.runtime.state(&container_id),
            init_pid = ?self.runtime.init_pid(&container_id),
            "Container is up"
        );

        let outcome = match self.runtime.attach(&container_id, &entry_point_args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(container = %container_id, error = %e, "Failed to execute the entry point");
                runtime_task.mark_spawn_failed();
                return false;
            }
        };
        info!(
            container = %container_id,
            exit_code = outcome.exit_code,
            stdout = %outcome.stdout,
            stderr = %outcome.stderr,
            "Entry point exited"
        );

        self.apply_teardown(&container_id).await;

        runtime_task.mark_spawned(container_id);
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

/// [`ContainerRuntime`] backed by the `lxc-*` command line tools.
pub struct LxcCommandRuntime {
    available: bool,
}

impl LxcCommandRuntime {
    const TOOLS: &'static [&'static str] = &[
        "lxc-create",
        "lxc-start",
        "lxc-stop",
        "lxc-destroy",
        "lxc-info",
        "lxc-attach",
    ];

    /// Probe `PATH` for the LXC tools once, at construction.
    pub fn detect() -> Self {
        let available = Self::TOOLS.iter().all(|tool| find_in_path(tool).is_some());
        if !available {
            debug!("LXC tools not found on PATH");
        }
        Self { available }
    }

    /// Query one `lxc-info` field in machine-readable form.
    fn info_field(&self, id: &str, flag: &str) -> Option<String> {
        let output = std::process::Command::new("lxc-info")
            .args(["-n", id, flag, "-H"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    async fn run_tool(&self, tool: &str, args: &[&str]) -> bool {
        match TokioCommand::new(tool).args(args).output().await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                debug!(
                    tool,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "LXC tool reported failure"
                );
                false
            }
            Err(e) => {
                debug!(tool, error = %e, "Failed to run LXC tool");
                false
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for LxcCommandRuntime {
    fn available(&self) -> bool {
        self.available
    }

    fn dependency_name(&self) -> &str {
        "LXC tools"
    }

    fn is_defined(&self, id: &str) -> bool {
        std::process::Command::new("lxc-info")
            .args(["-n", id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn is_running(&self, id: &str) -> bool {
        self.state(id).as_deref() == Some("RUNNING")
    }

    fn state(&self, id: &str) -> Option<String> {
        self.info_field(id, "-s")
    }

    fn init_pid(&self, id: &str) -> Option<i32> {
        self.info_field(id, "-p")?.parse().ok()
    }

    fn rootfs_path(&self, id: &str) -> Option<PathBuf> {
        let output = std::process::Command::new("lxc-info")
            .args(["-n", id, "-c", "lxc.rootfs.path"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let value = text.split('=').nth(1)?.trim();
        // Values may carry a backing-store prefix, e.g. "dir:/var/lib/...".
        let path = value.strip_prefix("dir:").unwrap_or(value);
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }

    async fn create_rootfs(&self, id: &str, image: &ContainerImage) -> bool {
        self.run_tool(
            "lxc-create",
            &[
                "-q", "-n", id, "-t", "download", "--", "-d", &image.dist, "-r", &image.release,
                "-a", &image.arch,
            ],
        )
        .await
    }

    async fn start(&self, id: &str) -> bool {
        self.run_tool("lxc-start", &["-n", id, "-d"]).await
    }

    async fn wait_network(&self, id: &str, timeout: Duration) -> bool {
        let id = id.to_string();
        let probe = async {
            loop {
                let output = TokioCommand::new("lxc-info")
                    .args(["-n", &id, "-i", "-H"])
                    .output()
                    .await;
                if let Ok(output) = output {
                    if output.status.success()
                        && !String::from_utf8_lossy(&output.stdout).trim().is_empty()
                    {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        };
        tokio::time::timeout(timeout, probe).await.is_ok()
    }

    async fn attach(&self, id: &str, argv: &[String]) -> io::Result<CommandOutcome> {
        let stdout_capture = TemporaryStreamCapture::new()?;
        let stderr_capture = TemporaryStreamCapture::new()?;

        let mut child = std::process::Command::new("lxc-attach")
            .args(["-n", id, "--"])
            .args(argv)
            .stdin(Stdio::null())
            .stdout(stdout_capture.writer()?)
            .stderr(stderr_capture.writer()?)
            .spawn()?;

        // The wait is a blocking syscall; keep it off the scheduler.
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(io::Error::other)??;

        Ok(CommandOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout_capture.read()?,
            stderr: stderr_capture.read()?,
        })
    }

    fn probe(&self, id: &str, argv: &[String]) -> io::Result<i32> {
        let status = std::process::Command::new("lxc-attach")
            .args(["-n", id, "--"])
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn stop(&self, id: &str) -> bool {
        self.run_tool("lxc-stop", &["-n", id]).await
    }

    async fn destroy(&self, id: &str) -> bool {
        self.run_tool("lxc-destroy", &["-n", id]).await
    }
}

/// Locate an executable on `PATH`.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isorun_core::{AttemptState, BaseDirResolver};
    use std::collections::{HashSet, VecDeque};
    use std::time::Instant;
    use tempfile::TempDir;

    struct FakeRuntime {
        available: bool,
        fail_create: bool,
        network_delay: Duration,
        rootfs: PathBuf,
        defined: Mutex<HashSet<String>>,
        running: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
        probe_script: Mutex<VecDeque<i32>>,
        net_spans: Mutex<Vec<(Instant, Instant)>>,
    }

    impl FakeRuntime {
        fn new(rootfs: PathBuf) -> Self {
            Self {
                available: true,
                fail_create: false,
                network_delay: Duration::ZERO,
                rootfs,
                defined: Mutex::new(HashSet::new()),
                running: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                probe_script: Mutex::new(VecDeque::new()),
                net_spans: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls_named(&self, name: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(name))
                .count()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        fn available(&self) -> bool {
            self.available
        }

        fn dependency_name(&self) -> &str {
            "scripted container runtime"
        }

        fn is_defined(&self, id: &str) -> bool {
            self.defined.lock().unwrap().contains(id)
        }

        fn is_running(&self, id: &str) -> bool {
            self.running.lock().unwrap().contains(id)
        }

        fn state(&self, id: &str) -> Option<String> {
            Some(if self.is_running(id) { "RUNNING" } else { "STOPPED" }.to_string())
        }

        fn init_pid(&self, id: &str) -> Option<i32> {
            self.is_running(id).then_some(4242)
        }

        fn rootfs_path(&self, _id: &str) -> Option<PathBuf> {
            Some(self.rootfs.clone())
        }

        async fn create_rootfs(&self, id: &str, _image: &ContainerImage) -> bool {
            self.record(format!("create:{id}"));
            if self.fail_create {
                return false;
            }
            self.defined.lock().unwrap().insert(id.to_string());
            true
        }

        async fn start(&self, id: &str) -> bool {
            self.record(format!("start:{id}"));
            self.running.lock().unwrap().insert(id.to_string());
            true
        }

        async fn wait_network(&self, id: &str, _timeout: Duration) -> bool {
            self.record(format!("network:{id}"));
            let started = Instant::now();
            tokio::time::sleep(self.network_delay).await;
            self.net_spans.lock().unwrap().push((started, Instant::now()));
            true
        }

        async fn attach(&self, id: &str, argv: &[String]) -> io::Result<CommandOutcome> {
            self.record(format!("attach:{id}:{}", argv.join(" ")));
            Ok(CommandOutcome {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        fn probe(&self, id: &str, _argv: &[String]) -> io::Result<i32> {
            self.record(format!("probe:{id}"));
            Ok(self.probe_script.lock().unwrap().pop_front().unwrap_or(1))
        }

        async fn stop(&self, id: &str) -> bool {
            self.record(format!("stop:{id}"));
            self.running.lock().unwrap().remove(id);
            true
        }

        async fn destroy(&self, id: &str) -> bool {
            self.record(format!("destroy:{id}"));
            self.defined.lock().unwrap().remove(id);
            true
        }
    }

    struct Fixture {
        runtime: Arc<FakeRuntime>,
        rootfs_dir: TempDir,
        _runner_dir: TempDir,
        runner_path: PathBuf,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();

            let rootfs_dir = TempDir::new().unwrap();
            std::fs::create_dir(rootfs_dir.path().join("root")).unwrap();
            let runner_dir = TempDir::new().unwrap();
            let runner_path = runner_dir.path().join("isorun-runner");
            std::fs::write(&runner_path, b"#!/bin/sh\nexit 0\n").unwrap();

            let mut settings = Settings::new();
            LxcSpawner::register_options(&mut settings);

            Self {
                runtime: Arc::new(FakeRuntime::new(rootfs_dir.path().to_path_buf())),
                rootfs_dir,
                _runner_dir: runner_dir,
                runner_path,
                settings,
            }
        }

        fn with_runtime(mut self, f: impl FnOnce(&mut FakeRuntime)) -> Self {
            f(Arc::get_mut(&mut self.runtime).unwrap());
            self
        }

        fn spawner(&self) -> LxcSpawner {
            LxcSpawner::new(
                self.runtime.clone(),
                self.settings.clone(),
                &self.runner_path,
                Arc::new(BaseDirResolver::new("/tmp/isorun-test-results")),
            )
        }
    }

    fn runtime_task(id: &str) -> RuntimeTask {
        RuntimeTask::new(Task::new(TaskId::new(id), vec!["--param".into(), "x".into()]))
    }

    #[test]
    fn test_entry_point_invocation_shape() {
        let task = Task::new(TaskId::new("t"), vec!["-k".into(), "exec".into()]);
        assert_eq!(
            LxcSpawner::entry_point_args(&task),
            vec!["/root/isorun-runner", "task-run", "-k", "exec"]
        );
    }

    #[test]
    fn test_registered_option_defaults() {
        let mut settings = Settings::new();
        LxcSpawner::register_options(&mut settings);
        assert_eq!(settings.get("spawner.lxc.dist").as_deref(), Some("fedora"));
        assert_eq!(settings.get("spawner.lxc.release").as_deref(), Some("32"));
        assert_eq!(settings.get("spawner.lxc.arch").as_deref(), Some("i386"));
    }

    #[tokio::test]
    async fn test_spawn_provisions_deploys_and_sets_handle() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(spawner.spawn_task(&mut rt).await);

        let handle = rt.spawner_handle.clone().expect("handle set on success");
        assert!(handle.starts_with("isorun-"));
        assert_eq!(rt.state, AttemptState::Alive);

        let deployed = fixture.rootfs_dir.path().join("root/isorun-runner");
        assert!(deployed.is_file());
        let mode = std::fs::metadata(&deployed).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);

        assert_eq!(fixture.runtime.calls_named("create"), 1);
        assert_eq!(fixture.runtime.calls_named("start"), 1);
        assert_eq!(fixture.runtime.calls_named("network"), 1);
        assert_eq!(fixture.runtime.calls_named("attach"), 1);
    }

    #[tokio::test]
    async fn test_respawn_reuses_defined_running_container() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner();

        let mut first = runtime_task("t1");
        assert!(spawner.spawn_task(&mut first).await);

        // A retry of the same task must not re-provision or fail merely
        // because the container already exists.
        let mut retry = runtime_task("t1");
        assert!(spawner.spawn_task(&mut retry).await);

        assert_eq!(first.spawner_handle, retry.spawner_handle);
        assert_eq!(fixture.runtime.calls_named("create"), 1);
        assert_eq!(fixture.runtime.calls_named("start"), 1);
        assert_eq!(fixture.runtime.calls_named("attach"), 2);
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_fast() {
        let fixture = Fixture::new().with_runtime(|rt| rt.available = false);
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(!spawner.spawn_task(&mut rt).await);
        assert_eq!(rt.state, AttemptState::SpawnFailed);
        assert!(rt.status.as_deref().unwrap().contains("not available"));
        // Fail fast: no partial provisioning work.
        assert_eq!(fixture.runtime.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rootfs_creation_failure_returns_false() {
        let fixture = Fixture::new().with_runtime(|rt| rt.fail_create = true);
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(!spawner.spawn_task(&mut rt).await);
        assert_eq!(rt.state, AttemptState::SpawnFailed);
        assert!(rt.spawner_handle.is_none());
    }

    #[tokio::test]
    async fn test_deploy_failure_is_caught() {
        let fixture = Fixture::new();
        // Remove the rootfs /root directory so the copy fails.
        std::fs::remove_dir(fixture.rootfs_dir.path().join("root")).unwrap();
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(!spawner.spawn_task(&mut rt).await);
        assert_eq!(rt.state, AttemptState::SpawnFailed);
    }

    #[tokio::test]
    async fn test_alive_requires_handle() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(!spawner.is_task_alive(&mut rt).unwrap());
        assert_eq!(fixture.runtime.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_alive_with_handle_but_missing_dependency_is_fatal() {
        let fixture = Fixture::new().with_runtime(|rt| rt.available = false);
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");
        rt.spawner_handle = Some("isorun-dead".into());

        let err = spawner.is_task_alive(&mut rt).unwrap_err();
        assert!(matches!(err, SpawnerError::MissingDependency(_)));
        assert!(rt.status.is_some());
    }

    #[tokio::test]
    async fn test_alive_follows_container_and_probe_state() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");
        assert!(spawner.spawn_task(&mut rt).await);

        // Probe script: runner still present once, then gone.
        fixture
            .runtime
            .probe_script
            .lock()
            .unwrap()
            .extend([0, 1]);
        assert!(spawner.is_task_alive(&mut rt).unwrap());
        assert!(!spawner.is_task_alive(&mut rt).unwrap());

        // A stopped container is not alive, without probing.
        let handle = rt.spawner_handle.clone().unwrap();
        fixture.runtime.running.lock().unwrap().remove(&handle);
        assert!(!spawner.is_task_alive(&mut rt).unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_spawns_use_distinct_containers_and_overlap() {
        let fixture = Fixture::new().with_runtime(|rt| {
            rt.network_delay = Duration::from_millis(150);
        });
        let spawner = fixture.spawner();
        let mut rt_a = runtime_task("t-a");
        let mut rt_b = runtime_task("t-b");

        let (ok_a, ok_b) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(spawner.spawn_task(&mut rt_a), spawner.spawn_task(&mut rt_b))
        })
        .await
        .expect("concurrent spawns deadlocked");
        assert!(ok_a && ok_b);
        assert_ne!(rt_a.spawner_handle, rt_b.spawner_handle);

        // One task's network wait must not serialize the other's.
        let spans = fixture.runtime.net_spans.lock().unwrap();
        assert_eq!(spans.len(), 2);
        let (a, b) = (spans[0], spans[1]);
        assert!(a.0 < b.1 && b.0 < a.1, "network waits did not overlap");
    }

    #[tokio::test]
    async fn test_teardown_policy_destroy() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner().with_teardown(TeardownPolicy::Destroy);
        let mut rt = runtime_task("t1");

        assert!(spawner.spawn_task(&mut rt).await);
        assert_eq!(fixture.runtime.calls_named("stop"), 1);
        assert_eq!(fixture.runtime.calls_named("destroy"), 1);

        let handle = rt.spawner_handle.clone().unwrap();
        assert!(!fixture.runtime.is_defined(&handle));
    }

    #[tokio::test]
    async fn test_teardown_policy_keep_running_by_default() {
        let fixture = Fixture::new();
        let spawner = fixture.spawner();
        let mut rt = runtime_task("t1");

        assert!(spawner.spawn_task(&mut rt).await);
        assert_eq!(fixture.runtime.calls_named("stop"), 0);
        assert_eq!(fixture.runtime.calls_named("destroy"), 0);

        let handle = rt.spawner_handle.clone().unwrap();
        assert!(fixture.runtime.is_running(&handle));
    }
}
