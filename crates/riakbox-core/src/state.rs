//! Lifecycle state of a test server.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a test server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// No sandbox on disk.
    Unprepared = 0,
    /// Sandbox written, no process yet.
    Prepared = 1,
    /// Process running and answering at its prompt.
    Started = 2,
    /// Process stopped or lost; the sandbox remains.
    Stopped = 3,
}

impl LifecycleState {
    /// Whether `start` may spawn a process from this state.
    pub fn can_start(self) -> bool {
        matches!(self, LifecycleState::Prepared | LifecycleState::Stopped)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Prepared,
            2 => LifecycleState::Started,
            3 => LifecycleState::Stopped,
            _ => LifecycleState::Unprepared,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unprepared => write!(f, "unprepared"),
            LifecycleState::Prepared => write!(f, "prepared"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lock-free cell holding a [`LifecycleState`].
///
/// Writers hold the lifecycle lock; readers never block.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Create a cell.
    pub fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state.
    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the state, returning the previous one.
    pub fn set(&self, state: LifecycleState) -> LifecycleState {
        let previous = LifecycleState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Lifecycle transition");
        }
        previous
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(LifecycleState::Unprepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_start() {
        assert!(!LifecycleState::Unprepared.can_start());
        assert!(LifecycleState::Prepared.can_start());
        assert!(!LifecycleState::Started.can_start());
        assert!(LifecycleState::Stopped.can_start());
    }

    #[test]
    fn test_cell_round_trip() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), LifecycleState::Unprepared);
        for state in [
            LifecycleState::Prepared,
            LifecycleState::Started,
            LifecycleState::Stopped,
            LifecycleState::Unprepared,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_set_returns_previous() {
        let cell = StateCell::new(LifecycleState::Prepared);
        assert_eq!(cell.set(LifecycleState::Started), LifecycleState::Prepared);
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::Started.to_string(), "started");
    }
}
