//! Lifecycle states for a single execution attempt.

use serde::{Deserialize, Serialize};

/// State of one RuntimeTask attempt under a given spawner.
///
/// Transitions: `Unspawned -> Spawning -> {Alive, SpawnFailed}`;
/// `Alive -> (polled) -> {Alive, Finished}`. There is no transition back to
/// `Unspawned`; a retry constructs a new RuntimeTask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    /// Attempt created but not yet handed to a spawner.
    #[default]
    Unspawned,
    /// A spawner is provisioning the execution environment.
    Spawning,
    /// The task was launched and has not yet been observed dead.
    Alive,
    /// Provisioning or launch failed. Terminal.
    SpawnFailed,
    /// A liveness probe observed the task gone. Terminal.
    Finished,
}

impl AttemptState {
    /// Returns true if the attempt is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SpawnFailed | Self::Finished)
    }

    /// Returns true if the attempt is still in flight (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(AttemptState::SpawnFailed.is_terminal());
        assert!(AttemptState::Finished.is_terminal());
        assert!(AttemptState::Unspawned.is_active());
        assert!(AttemptState::Alive.is_active());
    }
}
