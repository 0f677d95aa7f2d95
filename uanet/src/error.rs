//! Error types of the network layer.

use std::io;
use thiserror::Error;

/// Failure of a network-layer operation.
///
/// Transient OS conditions (interrupted calls, would-block) never show up
/// here: they are retried or reported as an empty receive.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A buffer could not be allocated. Nothing was changed; retrying later
    /// is safe.
    #[error("out of memory")]
    OutOfMemory,

    /// The connection was closed by the peer or locally. Terminal for that
    /// connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A buffer larger than the peer's negotiated receive size was requested.
    #[error("requested {requested} bytes, peer accepts at most {limit}")]
    CommunicationError { requested: usize, limit: usize },

    /// Socket setup failed (create, bind, listen, non-blocking toggle).
    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl NetworkError {
    pub(crate) fn internal(context: &'static str, source: io::Error) -> Self {
        Self::Internal { context, source }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Rejection reason for an endpoint URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("endpoint url length {0} outside 11..=511")]
    InvalidLength(usize),

    #[error("endpoint url is not ASCII")]
    NotAscii,

    #[error("endpoint url does not begin with opc.tcp://")]
    InvalidScheme,

    #[error("endpoint url has no host")]
    EmptyHost,

    #[error("endpoint url has no port")]
    MissingPort,

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}
