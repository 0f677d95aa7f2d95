//! Work items produced by the server layer.

use crate::Connection;

use std::fmt;
use std::sync::Arc;

/// Who allocated the buffer carried by a [`Job::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOrigin {
    /// The receive buffer of the network layer, passed through unchanged
    /// by the framer. Give it back with
    /// [`Connection::release_recv_buffer`].
    NetworkLayer,

    /// A buffer the framer allocated. Dropping it is enough.
    Allocated,
}

/// A unit of work for the worker pool.
///
/// Jobs of one batch are independent of each other except for
/// [`Job::DeferredFree`], which must only run once every job emitted
/// before it, in its own batch or an earlier one, has completed.
pub enum Job {
    /// One or more complete messages arrived on `connection`.
    Message {
        connection: Arc<Connection>,
        message: Vec<u8>,
        origin: BufferOrigin,
    },

    /// `connection` left the poll set. The protocol layer drops whatever
    /// session state it attached to it.
    Detach { connection: Arc<Connection> },

    /// Releases `connection`. See [`Connection::free`].
    DeferredFree { connection: Arc<Connection> },
}

impl Job {
    /// The connection this job refers to.
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            Job::Message { connection, .. }
            | Job::Detach { connection }
            | Job::DeferredFree { connection } => connection,
        }
    }

    /// Whether this job is subject to the deferred ordering rule.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Job::DeferredFree { .. })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Message {
                connection,
                message,
                origin,
            } => f
                .debug_struct("Message")
                .field("connection", &connection.id())
                .field("len", &message.len())
                .field("origin", origin)
                .finish(),
            Job::Detach { connection } => f
                .debug_struct("Detach")
                .field("connection", &connection.id())
                .finish(),
            Job::DeferredFree { connection } => f
                .debug_struct("DeferredFree")
                .field("connection", &connection.id())
                .finish(),
        }
    }
}
