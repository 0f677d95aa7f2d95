use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Socket created, not yet closed. Initial state of accepted and
/// connected sockets.
const OPENING: u8 = 0;

/// Terminal. The socket is shut down and every I/O and buffer operation
/// fails.
const CLOSED: u8 = 1;

/// Lifecycle state of a [`Connection`](super::Connection).
///
/// The only transition is `Opening -> Closed`, and it happens at most once.
/// Session-level states belong to the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Opening => f.write_str("opening"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

/// Atomic cell holding a [`ConnectionState`].
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        let raw = match state {
            ConnectionState::Opening => OPENING,
            ConnectionState::Closed => CLOSED,
        };
        Self(AtomicU8::new(raw))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            OPENING => ConnectionState::Opening,
            _ => ConnectionState::Closed,
        }
    }

    /// Moves to `Closed` with a single exchange.
    ///
    /// Returns `true` only for the caller that performed the transition;
    /// that caller owns the one-time shutdown side effect.
    pub(crate) fn close(&self) -> bool {
        self.0.swap(CLOSED, Ordering::AcqRel) != CLOSED
    }
}
