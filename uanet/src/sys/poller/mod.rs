//! Readiness polling.
//!
//! The server layer rebuilds a [`ReadySet`] on every cycle from the
//! listening socket and the connection table, then waits once for any of
//! them to become readable. Unlike a registered epoll/kqueue interest set,
//! the set is consumed by each wait, which is exactly the contract the
//! poll loop relies on.
//!
//! `poll(2)` backs the Unix implementation and `WSAPoll` the Windows one.

use std::time::Duration;

#[cfg(unix)]
mod poll;

#[cfg(windows)]
mod wsapoll;

#[cfg(unix)]
pub(crate) use poll::ReadySet;

#[cfg(windows)]
pub(crate) use wsapoll::ReadySet;

/// Converts a cycle budget to the millisecond granularity of the OS wait,
/// rounding up so that a non-zero budget never becomes a non-blocking poll.
pub(crate) fn timeout_millis(timeout: Duration) -> i32 {
    let micros = timeout.as_micros();
    micros.div_ceil(1000).min(i32::MAX as u128) as i32
}
