//! Boundary to the message framing layer.
//!
//! The network layer does not know where one protocol message ends and the
//! next begins. After every successful receive it hands the raw bytes to a
//! [`MessageFramer`], which keeps whatever partial chunk it needs per
//! connection and returns the complete messages that are now available.

use crate::Connection;
use crate::error::Result;

/// Output of [`MessageFramer::complete_messages`].
#[derive(Debug)]
pub struct Completed {
    /// Zero or more complete messages, back to back. Empty when the
    /// received bytes did not finish a message.
    pub buffer: Vec<u8>,

    /// `true` when `buffer` is not the receive buffer the network layer
    /// passed in but a fresh allocation (for example, a partial chunk from
    /// a previous receive joined with the new bytes).
    pub reallocated: bool,
}

/// Reassembles complete messages from received bytes.
///
/// Called only from the poll thread, once per successful non-empty
/// receive, with the connection the bytes arrived on.
pub trait MessageFramer: Send + Sync {
    fn complete_messages(&self, connection: &Connection, buffer: Vec<u8>) -> Result<Completed>;
}

/// Treats every receive as exactly one complete message.
///
/// Suitable when the peer never splits or coalesces messages, and for
/// testing the layer on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawFramer;

impl MessageFramer for RawFramer {
    fn complete_messages(&self, _connection: &Connection, buffer: Vec<u8>) -> Result<Completed> {
        Ok(Completed {
            buffer,
            reallocated: false,
        })
    }
}
