use super::timeout_millis;
use crate::sys::RawSocket;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, nfds_t, poll, pollfd};
use std::io;
use std::time::Duration;

/// Readiness mask that makes a socket worth a `recv`: data, an orderly
/// shutdown, or an error that `recv` will report.
const READABLE: i16 = POLLIN | POLLERR | POLLHUP | POLLNVAL;

/// A one-shot set of sockets waited on for readability with `poll(2)`.
pub(crate) struct ReadySet {
    fds: Vec<pollfd>,
}

impl ReadySet {
    pub(crate) fn new() -> Self {
        Self { fds: Vec::new() }
    }

    /// Empties the set, keeping its allocation.
    pub(crate) fn clear(&mut self) {
        self.fds.clear();
    }

    pub(crate) fn insert(&mut self, fd: RawSocket) {
        self.fds.push(pollfd {
            fd,
            events: POLLIN,
            revents: 0,
        });
    }

    /// Waits until a socket of the set is readable or `timeout` expires.
    ///
    /// Returns the number of ready sockets. An interrupted wait reports
    /// nothing ready.
    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        let rc = unsafe {
            poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                timeout_millis(timeout),
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            for pfd in &mut self.fds {
                pfd.revents = 0;
            }

            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        Ok(rc as usize)
    }

    /// Whether `fd` was reported readable by the last wait.
    pub(crate) fn is_ready(&self, fd: RawSocket) -> bool {
        self.fds
            .iter()
            .any(|pfd| pfd.fd == fd && pfd.revents & READABLE != 0)
    }

    /// Sockets reported readable by the last wait, in insertion order.
    pub(crate) fn ready(&self) -> impl Iterator<Item = RawSocket> + '_ {
        self.fds
            .iter()
            .filter(|pfd| pfd.revents & READABLE != 0)
            .map(|pfd| pfd.fd)
    }
}
