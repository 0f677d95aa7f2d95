use super::{Connection, alloc_buffer};
use crate::error::{NetworkError, Result};
use crate::sys::is_transient;

use std::time::Duration;
use tracing::{debug, trace};

impl Connection {
    /// Sends the whole `payload`, consuming it.
    ///
    /// Partial writes are continued from where they stopped; interrupted
    /// and would-block sends are retried in place. Any other failure, or a
    /// send that makes no progress, closes the connection and yields
    /// [`NetworkError::ConnectionClosed`]. The payload buffer is released on
    /// every path.
    pub fn send(&self, payload: Vec<u8>) -> Result<()> {
        let mut written = 0;

        while written < payload.len() {
            match self.socket.send(&payload[written..]) {
                Ok(0) => {
                    debug!(connection = %self.id, "send made no progress");
                    return Err(self.abort_send(payload));
                }
                Ok(n) => written += n,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    debug!(connection = %self.id, error = %e, "send failed");
                    return Err(self.abort_send(payload));
                }
            }
        }

        trace!(connection = %self.id, bytes = written, "sent");
        self.release_send_buffer(payload);

        Ok(())
    }

    fn abort_send(&self, payload: Vec<u8>) -> NetworkError {
        self.close();
        self.release_send_buffer(payload);

        NetworkError::ConnectionClosed
    }

    /// Performs one receive of at most `recv_buffer_size` bytes.
    ///
    /// Returns an empty buffer when no data is available yet (the socket is
    /// non-blocking, the call was interrupted, or `timeout` expired). An
    /// orderly shutdown by the peer, or any other receive error, closes the
    /// connection and yields [`NetworkError::ConnectionClosed`]. A server
    /// connection keeps its descriptor until the poll loop retires it, so
    /// this is safe to call from any thread.
    ///
    /// `timeout` is only meaningful on blocking client sockets; the server
    /// poll loop passes `None`.
    pub fn receive(&self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let mut buffer = alloc_buffer(self.local_config.recv_buffer_size as usize)?;

        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            if let Err(e) = self.socket.set_recv_timeout(timeout) {
                debug!(connection = %self.id, error = %e, "cannot set receive timeout");
                return Err(self.abort_receive());
            }
        }

        match self.socket.recv(&mut buffer) {
            Ok(0) => {
                debug!(connection = %self.id, "peer closed the connection");
                Err(self.abort_receive())
            }
            Ok(n) => {
                buffer.truncate(n);
                trace!(connection = %self.id, bytes = n, "received");
                Ok(buffer)
            }
            Err(e) if is_transient(&e) => Ok(Vec::new()),
            Err(e) => {
                debug!(connection = %self.id, error = %e, "receive failed");
                Err(self.abort_receive())
            }
        }
    }

    fn abort_receive(&self) -> NetworkError {
        self.ops.terminate(self);

        NetworkError::ConnectionClosed
    }
}
