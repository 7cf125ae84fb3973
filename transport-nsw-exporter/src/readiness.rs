//! Server lifecycle state shared between the HTTP server and its probes.
//!
//! The server is the only writer; probe handlers only read. Transitions are
//! monotonic (`NotStarted → Starting → Ready → ShuttingDown → Stopped`), so a
//! single atomic word with last-writer-wins semantics is sufficient.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::info;

/// Lifecycle state of the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServerState {
    NotStarted = 0,
    Starting = 1,
    Ready = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl ServerState {
    /// Returns true if the readiness probe should pass.
    pub fn is_ready(self) -> bool {
        matches!(self, ServerState::Ready)
    }

    /// Returns a short string representation of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::NotStarted => "not_started",
            ServerState::Starting => "starting",
            ServerState::Ready => "ready",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Stopped => "stopped",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::NotStarted,
            1 => ServerState::Starting,
            2 => ServerState::Ready,
            3 => ServerState::ShuttingDown,
            _ => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    state: AtomicU8,
    faulted: AtomicBool,
}

/// Shared lifecycle cell. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    /// Creates a new lifecycle in the `NotStarted` state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ServerState::NotStarted as u8),
                faulted: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Moves to `next`.
    pub fn transition(&self, next: ServerState) {
        let previous = ServerState::from_u8(self.inner.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            info!(from = %previous, to = %next, "Server state changed");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Records an unrecoverable fault; liveness fails from here on.
    pub fn mark_faulted(&self) {
        self.inner.faulted.store(true, Ordering::Release);
    }

    /// Returns true unless an unrecoverable fault was recorded.
    pub fn is_live(&self) -> bool {
        !self.inner.faulted.load(Ordering::Acquire)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
