//! Pluggable isolation backends for isorun tasks.
//!
//! A [`Spawner`] launches one task attempt inside an isolation backend,
//! probes whether it is still alive, awaits its completion, and streams the
//! output files it produced. Two backends ship with this crate: a bare
//! process backend ([`process::ProcessSpawner`]) and an LXC container
//! backend ([`lxc::LxcSpawner`]) driven through an injected
//! [`lxc::ContainerRuntime`] capability.

pub mod lxc;
pub mod output;
pub mod process;
pub mod spawner;
pub mod streams;
pub mod testing;

// Re-export commonly used types
pub use lxc::{ContainerRuntime, LxcCommandRuntime, LxcSpawner, TeardownPolicy};
pub use output::{ByteSource, OutputCollector, OutputFiles};
pub use process::ProcessSpawner;
pub use spawner::{Spawner, PROBE_INTERVAL};
pub use streams::TemporaryStreamCapture;
pub use testing::ScriptedSpawner;
