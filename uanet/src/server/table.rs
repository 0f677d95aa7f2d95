use crate::Connection;
use crate::sys::RawSocket;

use std::sync::Arc;

/// One polled socket and the connection it belongs to.
pub(crate) struct ConnectionMapping {
    pub(crate) socket: RawSocket,
    pub(crate) connection: Arc<Connection>,
}

/// Live connections of a server layer, keyed by socket.
///
/// Order is irrelevant: removal swaps the last entry into the hole. Only
/// the poll loop writes to the table, so it needs no lock; other threads
/// reach connections only through the `Arc`s handed out in jobs.
pub(crate) struct ConnectionTable {
    mappings: Vec<ConnectionMapping>,
}

impl ConnectionTable {
    pub(crate) fn new() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Adds a connection.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `socket` is already in the table.
    pub(crate) fn insert(&mut self, socket: RawSocket, connection: Arc<Connection>) {
        debug_assert!(
            self.position(socket).is_none(),
            "socket {socket} already mapped"
        );

        self.mappings.push(ConnectionMapping { socket, connection });
    }

    /// Index of the entry polling `socket`.
    pub(crate) fn position(&self, socket: RawSocket) -> Option<usize> {
        self.mappings.iter().position(|m| m.socket == socket)
    }

    pub(crate) fn get(&self, index: usize) -> &ConnectionMapping {
        &self.mappings[index]
    }

    /// Removes the entry at `index`, moving the last entry into its place.
    pub(crate) fn swap_remove(&mut self, index: usize) -> ConnectionMapping {
        self.mappings.swap_remove(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ConnectionMapping> {
        self.mappings.iter()
    }

    /// Removes every entry, keeping the allocation.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ConnectionMapping> + '_ {
        self.mappings.drain(..)
    }
}
