//! Per-peer connection state.
//!
//! A [`Connection`] couples an OS socket with the buffer limits of both
//! sides, an atomic lifecycle state and the capability set of whoever
//! created it (server layer or client connect).
//!
//! Server connections are shared as `Arc<Connection>` between the poll
//! loop and the worker threads running jobs; client connections are owned
//! by value by a single caller.

mod io;
mod ops;
mod state;

pub use state::ConnectionState;

pub(crate) use ops::{ClientOps, ConnectionOps, ServerOps};
pub(crate) use state::AtomicState;

use crate::config::ConnectionConfig;
use crate::error::{NetworkError, Result};
use crate::socket::Socket;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Remote limits before the protocol handshake filled them in: every send
/// buffer request is rejected.
const UNNEGOTIATED: ConnectionConfig = ConnectionConfig {
    protocol_version: 0,
    recv_buffer_size: 0,
    send_buffer_size: 0,
    max_message_size: 0,
    max_chunk_count: 0,
};

/// A TCP connection to one peer.
///
/// The socket is open iff the state is not [`ConnectionState::Closed`],
/// except for the short window in which a server connection has been
/// flagged closed and shut down but not yet released by the poll loop.
pub struct Connection {
    id: ConnectionId,
    pub(crate) socket: Socket,
    pub(crate) state: AtomicState,
    local_config: ConnectionConfig,
    remote_config: RwLock<ConnectionConfig>,
    peer: Option<SocketAddr>,
    ops: Box<dyn ConnectionOps>,
}

impl Connection {
    pub(crate) fn new(
        socket: Socket,
        local_config: ConnectionConfig,
        peer: Option<SocketAddr>,
        ops: Box<dyn ConnectionOps>,
    ) -> Self {
        let state = if socket.is_open() {
            ConnectionState::Opening
        } else {
            ConnectionState::Closed
        };

        Self {
            id: ConnectionId::next(),
            socket,
            state: AtomicState::new(state),
            local_config,
            remote_config: RwLock::new(UNNEGOTIATED),
            peer,
            ops,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Address of the peer, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Limits this side agreed to.
    pub fn local_config(&self) -> &ConnectionConfig {
        &self.local_config
    }

    /// Limits the peer advertised. All zero until
    /// [`set_remote_config`](Self::set_remote_config) is called.
    pub fn remote_config(&self) -> ConnectionConfig {
        *self.remote_config.read().unwrap()
    }

    /// Records the limits the peer advertised during the handshake.
    pub fn set_remote_config(&self, config: ConnectionConfig) {
        *self.remote_config.write().unwrap() = config;
    }

    /// Requests closure of the connection.
    ///
    /// Safe to call any number of times from any thread; only the first
    /// call has an effect, and only that call returns `true`.
    ///
    /// For a server connection this only shuts the socket down: the poll
    /// loop notices on its next cycle, drops the connection from its table
    /// and emits the detach and deferred free jobs. For a client connection
    /// the socket is released immediately.
    pub fn close(&self) -> bool {
        self.ops.close(self)
    }

    /// Allocates a buffer for an outgoing chunk of `length` bytes.
    ///
    /// Fails with [`NetworkError::CommunicationError`] when `length` exceeds
    /// the peer's receive size, before anything is allocated.
    pub fn get_send_buffer(&self, length: usize) -> Result<Vec<u8>> {
        self.ops.get_send_buffer(self, length)
    }

    /// Gives back a send buffer that was not passed to [`send`](Self::send).
    pub fn release_send_buffer(&self, buffer: Vec<u8>) {
        self.ops.release_send_buffer(self, buffer);
    }

    /// Gives back a buffer handed out by the network layer on receive.
    pub fn release_recv_buffer(&self, buffer: Vec<u8>) {
        self.ops.release_recv_buffer(self, buffer);
    }

    /// Flags the state, shuts the socket down if this call performed the
    /// transition, and releases the descriptor.
    ///
    /// Only the server poll loop calls this, after the connection has left
    /// its table, so a descriptor number cannot be handed out again while
    /// still mapped.
    pub(crate) fn close_socket(&self) {
        if self.state.close() {
            let _ = self.socket.shutdown();
        }

        if self.socket.close() {
            debug!(connection = %self.id, "socket released");
        }
    }

    /// Runs a deferred free: releases the last reference to `connection`.
    ///
    /// Returns `false`, leaving the connection alive, if another reference
    /// is still held somewhere. With a job pool that honors the deferred
    /// free ordering, this never happens.
    pub fn free(connection: Arc<Connection>) -> bool {
        match Arc::try_unwrap(connection) {
            Ok(connection) => {
                debug!(connection = %connection.id, "connection freed");
                true
            }
            Err(shared) => {
                warn!(
                    connection = %shared.id,
                    references = Arc::strong_count(&shared),
                    "deferred free while the connection is still referenced"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("peer", &self.peer)
            .field("local_config", &self.local_config)
            .finish_non_exhaustive()
    }
}

/// Allocates a zeroed buffer of `length` bytes, reporting allocation
/// failure instead of aborting.
pub(crate) fn alloc_buffer(length: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(length)
        .map_err(|_| NetworkError::OutOfMemory)?;
    buffer.resize(length, 0);

    Ok(buffer)
}
