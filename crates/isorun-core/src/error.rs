//! Core domain errors.

use thiserror::Error;

/// Errors a spawner surfaces across its interface boundary.
///
/// Ordinary provisioning failures (rootfs creation, deployment, start,
/// network readiness) are not represented here: `spawn_task` reports those
/// as a plain `false` plus a diagnostic on the RuntimeTask status.
#[derive(Debug, Error)]
pub enum SpawnerError {
    /// A task's output directory could not be found. Distinct from generic
    /// I/O errors so callers can tell "never produced output" apart from
    /// "disk broken".
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A required native backend dependency is absent. Fatal for liveness
    /// probes: a handle implies the dependency was present at spawn time.
    #[error("Required backend dependency missing: {0}")]
    MissingDependency(String),

    /// The backend does not support an optional contract point.
    #[error("Operation not supported by this spawner: {0}")]
    Unsupported(&'static str),

    /// Any other filesystem error, propagated unmodified.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpawnerError {
    /// Returns true for the domain "task never produced output" case.
    pub fn is_task_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_is_distinct_from_io() {
        let nf = SpawnerError::TaskNotFound("t1".into());
        let io = SpawnerError::Io(std::io::Error::other("disk broken"));
        assert!(nf.is_task_not_found());
        assert!(!io.is_task_not_found());
    }
}
