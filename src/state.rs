//! # Lifecycle states shared by the container FSM and by every vertex.
//!
//! ```text
//! Uninitialized ─► Initializing ─► Initialized ─► Starting ─► Started ─► Stopping ─► Stopped
//!                        │                            │                      │
//!                        └──────────────► Error ◄─────┴──────────────────────┘
//! ```
//!
//! [`AtomicState`] stores a [`State`] in an `AtomicU8` so that monitors, the
//! shutdown coordinator and snapshots can read a vertex's state without taking
//! the graph lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the container or of a single plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Starting = 3,
    Started = 4,
    Stopping = 5,
    Stopped = 6,
    Error = 7,
}

impl State {
    fn from_u8(raw: u8) -> State {
        match raw {
            0 => State::Uninitialized,
            1 => State::Initializing,
            2 => State::Initialized,
            3 => State::Starting,
            4 => State::Started,
            5 => State::Stopping,
            6 => State::Stopped,
            _ => State::Error,
        }
    }

    /// Returns a short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Initializing => "initializing",
            State::Initialized => "initialized",
            State::Starting => "starting",
            State::Started => "started",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Error => "error",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free cell holding a [`State`].
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `next` only if the current state is `expected`.
    ///
    /// Returns `false` (and leaves the state untouched) otherwise.
    #[inline]
    pub fn transition(&self, expected: State, next: State) -> bool {
        self.0
            .compare_exchange(expected as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Rewinds to `Uninitialized`; the only permitted regression.
    #[inline]
    pub fn reset(&self) {
        self.store(State::Uninitialized);
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(State::Uninitialized)
    }
}
