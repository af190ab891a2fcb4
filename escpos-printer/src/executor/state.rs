use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

/// Lifecycle of one printer executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorState {
    #[default]
    Idle,
    Connecting,
    Ready,
    Printing,
    Faulted,
}

impl ExecutorState {
    /// States in which jobs are accepted
    pub fn accepts_jobs(self) -> bool {
        matches!(self, Self::Ready | Self::Printing)
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Printing => "printing",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Capacity of the transition channel; slow subscribers lag rather than block
const TRANSITION_CAPACITY: usize = 64;

/// Current state plus a broadcast of every transition
pub(crate) struct StateCell {
    current: Mutex<ExecutorState>,
    transitions: broadcast::Sender<ExecutorState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            current: Mutex::new(ExecutorState::Idle),
            transitions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn get(&self) -> ExecutorState {
        *self.lock()
    }

    pub(crate) fn set(&self, next: ExecutorState) {
        self.update(|state| *state = next);
    }

    /// Inspect and change the state atomically; subscribers see the result
    /// only if it differs from the previous state
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut ExecutorState) -> R) -> R {
        let mut guard = self.lock();
        let before = *guard;
        let result = f(&mut guard);
        let after = *guard;
        if before != after {
            tracing::debug!(from = %before, to = %after, "Executor state changed");
            // No subscribers is fine
            let _ = self.transitions.send(after);
        }
        result
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ExecutorState> {
        self.transitions.subscribe()
    }
}
