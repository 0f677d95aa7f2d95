//! Server side of the network layer.
//!
//! A [`ServerNetworkLayer`] is driven by a single thread calling
//! [`get_jobs`](ServerNetworkLayer::get_jobs) in a loop. Each call is one
//! bounded pass:
//!
//! 1. rebuild the readiness set from the listening socket and every
//!    connection in the table,
//! 2. wait for readability, at most for the caller's budget,
//! 3. accept at most one new peer,
//! 4. receive from every ready connection, turning data into
//!    [`Job::Message`] and end of stream into a [`Job::Detach`] followed
//!    by a [`Job::DeferredFree`].
//!
//! Worker threads running the jobs may close connections at any time
//! through [`Connection::close`]. That only flags the state and shuts the
//! socket down; the table is never touched from outside the poll thread,
//! which is why it needs no lock.

mod builder;
mod table;

pub use builder::ServerNetworkLayerBuilder;

use table::ConnectionTable;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionId, ServerOps};
use crate::error::{NetworkError, Result};
use crate::framing::MessageFramer;
use crate::job::{BufferOrigin, Job};
use crate::socket::Socket;
use crate::sys::platform::{
    sys_accept, sys_bind, sys_close, sys_hostname, sys_init, sys_listen, sys_set_nodelay,
    sys_set_nonblocking, sys_set_reuseaddr, sys_socket, sys_sockname,
};
use crate::sys::{RawSocket, ReadySet, is_transient};

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pending connections the OS queues before refusing new peers.
const MAX_BACKLOG: i32 = 100;

/// TCP server network layer.
///
/// Owns the listening socket and the table of live connections. Not
/// `Sync` by intent: exactly one thread polls it.
pub struct ServerNetworkLayer {
    port: u16,
    config: ConnectionConfig,
    discovery_url: Arc<str>,
    framer: Arc<dyn MessageFramer>,
    listener: Option<Socket>,
    table: ConnectionTable,
    ready: ReadySet,
}

impl ServerNetworkLayer {
    pub(crate) fn new(port: u16, config: ConnectionConfig, framer: Arc<dyn MessageFramer>) -> Self {
        let host = sys_hostname().unwrap_or_else(|e| {
            debug!(error = %e, "hostname unavailable");
            String::from("localhost")
        });

        Self {
            port,
            config,
            discovery_url: format!("opc.tcp://{host}:{port}").into(),
            framer,
            listener: None,
            table: ConnectionTable::new(),
            ready: ReadySet::new(),
        }
    }

    /// Shorthand for [`ServerNetworkLayerBuilder::new`].
    pub fn builder(port: u16) -> ServerNetworkLayerBuilder {
        ServerNetworkLayerBuilder::new(port)
    }

    /// `opc.tcp://<hostname>:<port>`, as computed at construction.
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Address the listening socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let fd = self.listener.as_ref()?.raw()?;
        sys_sockname(fd).ok()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Socket::is_open)
    }

    /// Number of connections currently polled.
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Whether the connection with `id` is still polled.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.table.iter().any(|m| m.connection.id() == id)
    }

    /// Creates, configures and binds the listening socket.
    ///
    /// Binds the IPv4 wildcard address with `SO_REUSEADDR` and a backlog of
    /// 100. Every failure is reported and leaves the layer stopped; nothing
    /// is retried.
    pub fn start(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(NetworkError::internal(
                "network layer already started",
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }

        sys_init();

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port));
        let fd = sys_socket(&addr).map_err(|e| {
            warn!(error = %e, "error opening socket");
            NetworkError::internal("error opening socket", e)
        })?;

        if let Err((context, e)) = Self::configure_listener(fd, &addr) {
            warn!(error = %e, "{context}");
            sys_close(fd);
            return Err(NetworkError::internal(context, e));
        }

        self.listener = Some(Socket::from_raw(fd));
        info!(url = %self.discovery_url, "TCP network layer listening");

        Ok(())
    }

    fn configure_listener(
        fd: RawSocket,
        addr: &SocketAddr,
    ) -> std::result::Result<(), (&'static str, io::Error)> {
        sys_set_reuseaddr(fd).map_err(|e| ("error setting socket options", e))?;
        sys_bind(fd, addr).map_err(|e| ("error binding socket", e))?;
        sys_set_nonblocking(fd).map_err(|e| ("error setting socket non-blocking", e))?;
        sys_listen(fd, MAX_BACKLOG).map_err(|e| ("error listening on socket", e))?;

        Ok(())
    }

    /// Runs one poll cycle and returns the jobs it produced.
    ///
    /// Waits at most `timeout` for readiness; `Duration::ZERO` only checks.
    /// A failed wait produces no jobs. The returned vector only allocates
    /// when there is at least one job.
    pub fn get_jobs(&mut self, timeout: Duration) -> Vec<Job> {
        let Some(listen_fd) = self.listener.as_ref().and_then(Socket::raw) else {
            return Vec::new();
        };

        self.ready.clear();
        self.ready.insert(listen_fd);
        for mapping in self.table.iter() {
            self.ready.insert(mapping.socket);
        }

        match self.ready.wait(timeout) {
            Ok(0) => return Vec::new(),
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "readiness wait failed");
                return Vec::new();
            }
        }

        let ready: Vec<RawSocket> = self.ready.ready().filter(|&fd| fd != listen_fd).collect();

        // Only one new connection per cycle; the rest wait in the backlog.
        if self.ready.is_ready(listen_fd) {
            self.accept(listen_fd);
        }

        let mut jobs = Vec::new();
        for fd in ready {
            let Some(index) = self.table.position(fd) else {
                continue;
            };

            let connection = self.table.get(index).connection.clone();
            match connection.receive(None) {
                Ok(buffer) if buffer.is_empty() => {}
                Ok(buffer) => {
                    if let Some(job) = self.frame(connection, buffer) {
                        jobs.push(job);
                    }
                }
                Err(NetworkError::ConnectionClosed) => {
                    let mapping = self.table.swap_remove(index);
                    mapping.connection.close_socket();
                    info!(connection = %mapping.connection.id(), "connection closed");

                    jobs.push(Job::Detach {
                        connection: mapping.connection.clone(),
                    });
                    jobs.push(Job::DeferredFree {
                        connection: mapping.connection,
                    });
                }
                Err(e) => {
                    warn!(connection = %connection.id(), error = %e, "receive failed, retrying next cycle");
                }
            }
        }

        jobs
    }

    fn frame(&self, connection: Arc<Connection>, buffer: Vec<u8>) -> Option<Job> {
        let completed = match self.framer.complete_messages(&connection, buffer) {
            Ok(completed) => completed,
            Err(e) => {
                debug!(connection = %connection.id(), error = %e, "framing failed");
                return None;
            }
        };

        if completed.buffer.is_empty() {
            return None;
        }

        let origin = if completed.reallocated {
            BufferOrigin::Allocated
        } else {
            BufferOrigin::NetworkLayer
        };

        Some(Job::Message {
            connection,
            message: completed.buffer,
            origin,
        })
    }

    /// Accepts one pending peer. Failures only mean no new connection
    /// this cycle.
    fn accept(&mut self, listen_fd: RawSocket) {
        let (fd, peer) = match sys_accept(listen_fd) {
            Ok(accepted) => accepted,
            Err(e) => {
                if !is_transient(&e) {
                    debug!(error = %e, "accept failed");
                }
                return;
            }
        };

        if let Err(e) = sys_set_nonblocking(fd) {
            warn!(error = %e, %peer, "cannot make accepted socket non-blocking");
            sys_close(fd);
            return;
        }

        if let Err(e) = sys_set_nodelay(fd) {
            debug!(error = %e, %peer, "cannot disable delayed ack");
        }

        let ops = ServerOps {
            endpoint: self.discovery_url.clone(),
        };
        let connection = Arc::new(Connection::new(
            Socket::from_raw(fd),
            self.config,
            Some(peer),
            Box::new(ops),
        ));

        info!(connection = %connection.id(), socket = fd, %peer, "new connection over TCP");
        self.table.insert(fd, connection);
    }

    /// Stops listening and retires every connection.
    ///
    /// Each remaining connection is closed synchronously and yields a
    /// [`Job::Detach`] and a [`Job::DeferredFree`], in that order. The
    /// layer can be dropped once the worker pool has run them all.
    pub fn stop(&mut self) -> Vec<Job> {
        info!(
            connections = self.table.len(),
            "shutting down the TCP network layer"
        );

        if let Some(listener) = self.listener.take() {
            let _ = listener.shutdown();
            listener.close();
        }

        let mut jobs = Vec::with_capacity(self.table.len() * 2);
        for mapping in self.table.drain() {
            mapping.connection.close_socket();

            jobs.push(Job::Detach {
                connection: mapping.connection.clone(),
            });
            jobs.push(Job::DeferredFree {
                connection: mapping.connection,
            });
        }

        jobs
    }
}
