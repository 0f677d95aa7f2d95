//! # uanet
//!
//! **uanet** is the TCP network layer of a binary request/response protocol
//! stack (OPC UA style `opc.tcp://` endpoints). It owns the raw sockets,
//! turns socket readiness into discrete jobs for a worker pool, and manages
//! the lifetime of per-peer connections across those workers.
//!
//! It provides:
//!
//! - a **server layer** driven by one polling thread: accepts peers,
//!   receives data and emits [`Job`]s
//! - a **client connect** routine returning a single owned [`Connection`]
//! - a **job pool** that runs jobs on worker threads and delays every
//!   [`Job::DeferredFree`] until all earlier jobs are done
//!
//! Message framing and the protocol state machine are not part of this
//! crate; framing plugs in through [`MessageFramer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use uanet::{Connection, Job, JobPoolBuilder, ServerNetworkLayerBuilder};
//!
//! let mut layer = ServerNetworkLayerBuilder::new(4840).build();
//! layer.start().expect("listen");
//!
//! let pool = JobPoolBuilder::new().build(|job: Job| match job {
//!     Job::Message { connection, message, .. } => {
//!         // echo
//!         let _ = connection.send(message);
//!     }
//!     Job::Detach { .. } => {}
//!     Job::DeferredFree { connection } => {
//!         Connection::free(connection);
//!     }
//! });
//!
//! loop {
//!     let jobs = layer.get_jobs(Duration::from_millis(10));
//!     pool.dispatch(jobs);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: endpoint URL parsing and outbound connect
//! - [`server`]: listening socket, poll loop, connection table
//! - [`pool`]: worker pool with deferred free ordering

mod config;
mod connection;
mod error;
mod framing;
mod job;
mod socket;
mod sys;

pub mod client;
pub mod pool;
pub mod server;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use error::{NetworkError, Result, UrlError};
pub use framing::{Completed, MessageFramer, RawFramer};
pub use job::{BufferOrigin, Job};
pub use pool::{JobHandler, JobPool, JobPoolBuilder};
pub use server::{ServerNetworkLayer, ServerNetworkLayerBuilder};
