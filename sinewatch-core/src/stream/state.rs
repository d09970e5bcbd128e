//! Run-state flag shared between the caller and the capture loop.
//!
//! Transitions are triggered externally (`start`/`stop`/`close`) and read by
//! the capture loop once per iteration, so a command takes effect on the next
//! chunk boundary, or within one poll interval while paused. `Closed` is
//! terminal: once observed, no transition can leave it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle of one capture stream: `Idle → Running ⇄ Paused → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Device open (or not yet open), capture loop parked.
    Idle,
    /// Actively reading chunks and detecting.
    Running,
    /// Capture suspended without tearing down the device.
    Paused,
    /// Stream torn down; the loop has exited or is about to.
    Closed,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Closed,
        }
    }
}

/// Lock-free shared cell holding a [`RunState`].
#[derive(Debug, Clone)]
pub struct SharedRunState(Arc<AtomicU8>);

impl SharedRunState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RunState::Idle as u8)))
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store a new state. No-op once `Closed` has been reached.
    pub fn set(&self, state: RunState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if RunState::from_u8(current) == RunState::Closed {
                    None
                } else {
                    Some(state as u8)
                }
            });
    }

    pub fn is_running(&self) -> bool {
        self.get() == RunState::Running
    }

    pub fn is_closed(&self) -> bool {
        self.get() == RunState::Closed
    }
}

impl Default for SharedRunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = SharedRunState::new();
        assert_eq!(state.get(), RunState::Idle);
        assert!(!state.is_running());
    }

    #[test]
    fn running_and_paused_alternate() {
        let state = SharedRunState::new();
        state.set(RunState::Running);
        assert!(state.is_running());
        state.set(RunState::Paused);
        assert_eq!(state.get(), RunState::Paused);
        state.set(RunState::Running);
        assert!(state.is_running());
    }

    #[test]
    fn closed_is_terminal() {
        let state = SharedRunState::new();
        state.set(RunState::Closed);
        state.set(RunState::Running);
        assert!(state.is_closed());
    }

    #[test]
    fn clones_share_the_same_cell() {
        let state = SharedRunState::new();
        let observer = state.clone();
        state.set(RunState::Running);
        assert!(observer.is_running());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&RunState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
