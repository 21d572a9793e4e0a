//! Coordinator state machine
//!
//! Which writes are allowed on the link is a function of the current state.
//! The coordinator and its heartbeat task feed [`Transition`]s in; nothing
//! else mutates the state.

/// Coordinator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Heartbeat running or about to start
    Idle,
    /// A command byte is being written
    Dispatching,
    /// No usable connection; liveness signal has stopped
    Disconnected,
    /// Session torn down; no further events accepted
    Stopped,
}

/// Inputs that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Heartbeat acknowledged cancellation, command write begins
    CommandReceived,
    /// Command write finished (either outcome), heartbeat restarts
    DispatchFinished,
    /// Heartbeat write failed
    HeartbeatFailed,
    /// A write found the connection absent or invalid
    ConnectionLost,
    /// External teardown
    Teardown,
}

impl CoordinatorState {
    /// Check if a command may be written in this state
    pub fn accepts_commands(&self) -> bool {
        matches!(self, CoordinatorState::Idle)
    }

    /// Check if this state ends the liveness signal
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Disconnected | CoordinatorState::Stopped)
    }

    /// Process a transition and return the next state
    pub fn transition(self, event: Transition) -> Self {
        use CoordinatorState::*;
        use Transition::*;

        match (self, event) {
            (_, Teardown) => Stopped,
            (Stopped, _) => Stopped,

            (Idle, CommandReceived) => Dispatching,
            (Dispatching, DispatchFinished) => Idle,

            (Idle | Dispatching, HeartbeatFailed | ConnectionLost) => Disconnected,

            // Anything else leaves the state unchanged
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_round_trip() {
        let state = CoordinatorState::Idle.transition(Transition::CommandReceived);
        assert_eq!(state, CoordinatorState::Dispatching);
        assert!(!state.accepts_commands());
        assert_eq!(
            state.transition(Transition::DispatchFinished),
            CoordinatorState::Idle
        );
    }

    #[test]
    fn test_heartbeat_failure_disconnects() {
        assert_eq!(
            CoordinatorState::Idle.transition(Transition::HeartbeatFailed),
            CoordinatorState::Disconnected
        );
        assert_eq!(
            CoordinatorState::Idle.transition(Transition::ConnectionLost),
            CoordinatorState::Disconnected
        );
    }

    #[test]
    fn test_disconnected_ignores_commands() {
        let state = CoordinatorState::Disconnected;
        assert_eq!(state.transition(Transition::CommandReceived), state);
        assert_eq!(state.transition(Transition::DispatchFinished), state);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_teardown_is_absorbing() {
        for state in [
            CoordinatorState::Idle,
            CoordinatorState::Dispatching,
            CoordinatorState::Disconnected,
            CoordinatorState::Stopped,
        ] {
            let stopped = state.transition(Transition::Teardown);
            assert_eq!(stopped, CoordinatorState::Stopped);
            assert_eq!(
                stopped.transition(Transition::CommandReceived),
                CoordinatorState::Stopped
            );
        }
    }
}
