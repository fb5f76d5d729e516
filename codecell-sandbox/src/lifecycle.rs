//! The per-call state machine:
//!
//! ```text
//!  created ──launch──▶ running ──exit──▶ reaped
//!     │                   │
//!     │                ┌──┴──┐
//!     │             deadline  memory/pids
//!     │                │       │
//!     │                ▼       ▼
//!     └──reject──▶  killed ──▶ reaped
//! ```
//!
//! `Reaped` is terminal and reached on every path, including errors.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Killed,
    Reaped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Killed)
                | (Running, Killed)
                | (Running, Reaped)
                | (Killed, Reaped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_can_reject_directly_to_killed() {
        assert!(LifecycleState::Created.can_transition_to(LifecycleState::Killed));
    }

    #[test]
    fn reaped_is_terminal() {
        assert!(!LifecycleState::Reaped.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Reaped.can_transition_to(LifecycleState::Killed));
    }

    #[test]
    fn running_cannot_go_back_to_created() {
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Created));
    }
}
