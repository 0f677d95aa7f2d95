use super::timeout_millis;
use crate::sys::RawSocket;

use std::io;
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock::{
    POLLERR, POLLHUP, POLLNVAL, POLLRDNORM, SOCKET, SOCKET_ERROR, WSAPOLLFD, WSAPoll,
};

/// `WSAPoll` rejects `POLLPRI`, so readability is requested as `POLLRDNORM`.
const READABLE: i16 = (POLLRDNORM | POLLERR | POLLHUP | POLLNVAL) as i16;

/// A one-shot set of sockets waited on for readability with `WSAPoll`.
pub(crate) struct ReadySet {
    fds: Vec<WSAPOLLFD>,
}

impl ReadySet {
    pub(crate) fn new() -> Self {
        Self { fds: Vec::new() }
    }

    pub(crate) fn clear(&mut self) {
        self.fds.clear();
    }

    pub(crate) fn insert(&mut self, fd: RawSocket) {
        self.fds.push(WSAPOLLFD {
            fd: fd as SOCKET,
            events: POLLRDNORM as _,
            revents: 0,
        });
    }

    /// Waits until a socket of the set is readable or `timeout` expires.
    ///
    /// `WSAPoll` refuses an empty array, which never happens here since the
    /// listening socket is always part of the set.
    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        let rc = unsafe {
            WSAPoll(
                self.fds.as_mut_ptr(),
                self.fds.len() as u32,
                timeout_millis(timeout),
            )
        };

        if rc == SOCKET_ERROR {
            for pfd in &mut self.fds {
                pfd.revents = 0;
            }
            return Err(io::Error::last_os_error());
        }

        Ok(rc as usize)
    }

    pub(crate) fn is_ready(&self, fd: RawSocket) -> bool {
        self.fds
            .iter()
            .any(|pfd| pfd.fd == fd as SOCKET && (pfd.revents as i16) & READABLE != 0)
    }

    pub(crate) fn ready(&self) -> impl Iterator<Item = RawSocket> + '_ {
        self.fds
            .iter()
            .filter(|pfd| (pfd.revents as i16) & READABLE != 0)
            .map(|pfd| pfd.fd as RawSocket)
    }
}
