use crate::sys::RawSocket;
use crate::sys::platform::{sys_close, sys_recv, sys_send, sys_set_recv_timeout, sys_shutdown};

use std::io;
use std::sync::RwLock;
use std::time::Duration;

/// An owned OS socket.
///
/// The descriptor sits behind a read/write lock: I/O and `shutdown` take
/// the shared side and may run from any thread, while [`close`](Self::close)
/// takes the exclusive side and releases the descriptor exactly once. Once
/// closed, every operation fails with `NotConnected` instead of touching a
/// descriptor number the OS may already have handed out again.
pub(crate) struct Socket {
    /// Descriptor value recorded at creation, used as the table key and in
    /// log lines. Never used for I/O.
    raw: Option<RawSocket>,

    /// Live descriptor, `None` once closed.
    fd: RwLock<Option<RawSocket>>,
}

impl Socket {
    /// Takes ownership of an open descriptor.
    pub(crate) fn from_raw(fd: RawSocket) -> Self {
        Self {
            raw: Some(fd),
            fd: RwLock::new(Some(fd)),
        }
    }

    /// A socket that was never opened.
    pub(crate) fn closed() -> Self {
        Self {
            raw: None,
            fd: RwLock::new(None),
        }
    }

    /// Descriptor value this socket was created with.
    pub(crate) fn raw(&self) -> Option<RawSocket> {
        self.raw
    }

    pub(crate) fn is_open(&self) -> bool {
        self.fd.read().unwrap().is_some()
    }

    fn with_fd<T>(&self, f: impl FnOnce(RawSocket) -> io::Result<T>) -> io::Result<T> {
        let guard = self.fd.read().unwrap();

        match *guard {
            Some(fd) => f(fd),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    pub(crate) fn send(&self, buffer: &[u8]) -> io::Result<usize> {
        self.with_fd(|fd| sys_send(fd, buffer))
    }

    pub(crate) fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        self.with_fd(|fd| sys_recv(fd, buffer))
    }

    pub(crate) fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.with_fd(|fd| sys_set_recv_timeout(fd, timeout))
    }

    /// Shuts down both directions without releasing the descriptor.
    ///
    /// Wakes any thread blocked in `recv` or polling this socket.
    pub(crate) fn shutdown(&self) -> io::Result<()> {
        self.with_fd(sys_shutdown)
    }

    /// Releases the descriptor. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        match self.fd.write().unwrap().take() {
            Some(fd) => {
                sys_close(fd);
                true
            }
            None => false,
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let fd = match self.fd.get_mut() {
            Ok(fd) => fd.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(fd) = fd {
            sys_close(fd);
        }
    }
}
