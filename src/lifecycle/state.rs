//! Orchestrator lifecycle states.
//!
//! ```text
//! Uninitialized → Initializing → Running → Stopping → Stopped
//!                      ↓
//!                    Failed
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// The single legal edge out of each state (plus `Initializing → Failed`).
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn test_forward_path() {
        let path = [Uninitialized, Initializing, Running, Stopping, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_revisits_or_shortcuts() {
        assert!(!Running.can_transition_to(Initializing));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Uninitialized.can_transition_to(Running));
        assert!(!Running.can_transition_to(Failed));
        assert!(!Stopping.can_transition_to(Stopping));
        assert!(!Failed.can_transition_to(Initializing));
    }

    #[test]
    fn test_failed_only_from_initializing() {
        assert!(Initializing.can_transition_to(Failed));
        assert!(Failed.is_terminal());
        assert!(Stopped.is_terminal());
        assert!(!Running.is_terminal());
    }
}
