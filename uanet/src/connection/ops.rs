//! Per-origin capability sets.
//!
//! A connection behaves differently depending on who created it. The
//! server variant is shared with the poll loop and must never release the
//! socket from a foreign thread; the client variant has a single owner and
//! closes eagerly. The variant is picked once, when the connection is
//! built.

use super::{Connection, alloc_buffer};
use crate::error::{NetworkError, Result};

use std::sync::Arc;
use tracing::info;

pub(crate) trait ConnectionOps: Send + Sync {
    /// Requests closure. Returns `true` for the one call that performed it.
    fn close(&self, connection: &Connection) -> bool;

    /// Closure forced by the receive path: end of stream or a hard error.
    fn terminate(&self, connection: &Connection);

    /// Allocates a buffer for an outgoing chunk of `length` bytes.
    fn get_send_buffer(&self, connection: &Connection, length: usize) -> Result<Vec<u8>>;

    fn release_send_buffer(&self, _connection: &Connection, buffer: Vec<u8>) {
        drop(buffer);
    }

    fn release_recv_buffer(&self, _connection: &Connection, buffer: Vec<u8>) {
        drop(buffer);
    }
}

fn check_remote_limit(connection: &Connection, length: usize) -> Result<usize> {
    let limit = connection.remote_config().recv_buffer_size as usize;

    if length > limit {
        return Err(NetworkError::CommunicationError {
            requested: length,
            limit,
        });
    }

    Ok(limit)
}

/// Capabilities of connections accepted by a
/// [`ServerNetworkLayer`](crate::ServerNetworkLayer).
#[derive(Clone)]
pub(crate) struct ServerOps {
    /// Discovery URL of the owning layer, for log lines.
    pub(crate) endpoint: Arc<str>,
}

impl ConnectionOps for ServerOps {
    /// Only shuts the socket down. The poll loop then sees it readable,
    /// receives the end of stream and performs the removal and release on
    /// its own thread.
    fn close(&self, connection: &Connection) -> bool {
        if !connection.state.close() {
            return false;
        }

        info!(
            connection = %connection.id(),
            endpoint = %self.endpoint,
            "closing the connection"
        );
        let _ = connection.socket.shutdown();

        true
    }

    /// Same as `close` without the log line. The receive may run on a
    /// worker thread, so the descriptor stays open until the poll loop
    /// has dropped the connection from its table.
    fn terminate(&self, connection: &Connection) {
        if connection.state.close() {
            let _ = connection.socket.shutdown();
        }
    }

    fn get_send_buffer(&self, connection: &Connection, length: usize) -> Result<Vec<u8>> {
        check_remote_limit(connection, length)?;
        alloc_buffer(length)
    }
}

/// Capabilities of connections returned by [`client::connect`](crate::client::connect).
pub(crate) struct ClientOps;

impl ConnectionOps for ClientOps {
    fn close(&self, connection: &Connection) -> bool {
        if !connection.state.close() {
            return false;
        }

        let _ = connection.socket.shutdown();
        connection.socket.close();

        true
    }

    fn terminate(&self, connection: &Connection) {
        if connection.state.close() {
            let _ = connection.socket.shutdown();
        }
        connection.socket.close();
    }

    /// Always hands out a buffer of the peer's full receive size.
    fn get_send_buffer(&self, connection: &Connection, length: usize) -> Result<Vec<u8>> {
        let limit = check_remote_limit(connection, length)?;

        if connection.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }

        alloc_buffer(limit)
    }
}
