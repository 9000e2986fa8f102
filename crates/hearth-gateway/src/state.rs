//! Connection state types.

use std::sync::atomic::{AtomicU32, Ordering};

/// State of a gateway link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not connected.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Connected, waiting for the sensor inventory.
    Discovering,
    /// Subscribed and receiving data.
    Streaming,
}

/// Atomic wrapper for link state, readable from any thread without a lock.
#[derive(Debug)]
pub struct AtomicLinkState(AtomicU32);

impl AtomicLinkState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: LinkState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> LinkState {
        match self.0.load(Ordering::SeqCst) {
            1 => LinkState::Connecting,
            2 => LinkState::Discovering,
            3 => LinkState::Streaming,
            _ => LinkState::Disconnected,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: LinkState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}
