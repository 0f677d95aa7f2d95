//! Client side of the network layer.
//!
//! There is no table and no poll loop on this side: [`connect`] returns a
//! single [`Connection`] that the caller owns and drives directly with
//! [`Connection::send`], [`Connection::receive`] and
//! [`Connection::close`].

mod url;

pub use url::EndpointUrl;

use crate::config::ConnectionConfig;
use crate::connection::{ClientOps, Connection};
use crate::socket::Socket;
use crate::sys::platform::{sys_connect, sys_set_nosigpipe, sys_socket};

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::{debug, warn};

/// Connects to `endpoint_url` (`opc.tcp://host:port`).
///
/// Never fails outright: on a malformed URL, a failed name lookup, or a
/// socket or connect error, the returned connection is already
/// [`Closed`](crate::ConnectionState::Closed). Check
/// [`Connection::state`] before using it.
///
/// On success the connection is `Opening`, blocking, and has no remote
/// limits yet; receives accept an optional timeout.
pub fn connect(local_config: ConnectionConfig, endpoint_url: &str) -> Connection {
    let closed = || Connection::new(Socket::closed(), local_config, None, Box::new(ClientOps));

    let endpoint = match EndpointUrl::parse(endpoint_url) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(url = endpoint_url, error = %e, "invalid server url");
            return closed();
        }
    };

    let addr = match resolve(&endpoint) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(host = endpoint.host(), error = %e, "DNS lookup failed");
            return closed();
        }
    };

    let fd = match sys_socket(&addr) {
        Ok(fd) => fd,
        Err(e) => {
            warn!(error = %e, "could not create socket");
            return closed();
        }
    };

    let connection = Connection::new(
        Socket::from_raw(fd),
        local_config,
        Some(addr),
        Box::new(ClientOps),
    );

    if let Err(e) = sys_connect(fd, &addr) {
        connection.close();
        warn!(%addr, error = %e, "connection failed");
        return connection;
    }

    if let Err(e) = sys_set_nosigpipe(fd) {
        warn!(error = %e, "couldn't set SO_NOSIGPIPE");
        return connection;
    }

    debug!(connection = %connection.id(), %addr, "connected");
    connection
}

/// Resolves the endpoint host, preferring an IPv4 address.
fn resolve(endpoint: &EndpointUrl) -> io::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port())
        .to_socket_addrs()?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))
}
