//! Platform socket layer.
//!
//! Every OS difference of the network layer lives below this module:
//! socket creation and options, blocking-with-retry friendly `send`/`recv`
//! wrappers, shutdown/close and readiness polling.
//!
//! The concrete implementation is selected at compile time. Both backends
//! expose the same `sys_*` function names and the same [`ReadySet`]
//! type, so the connection, server and client modules stay
//! platform-agnostic.

pub(crate) mod poller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) use windows as platform;

pub(crate) use platform::RawSocket;
pub(crate) use poller::ReadySet;

use std::io;

/// Returns `true` for OS conditions that are retried or reported as
/// "no data yet" instead of being surfaced as errors.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
