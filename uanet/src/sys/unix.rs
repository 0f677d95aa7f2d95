use libc::{
    AF_INET, AF_INET6, F_GETFL, F_SETFL, IPPROTO_TCP, O_NONBLOCK, SHUT_RDWR, SO_RCVTIMEO,
    SO_REUSEADDR, SOCK_STREAM, SOL_SOCKET, TCP_NODELAY, accept, bind, c_char, c_int, c_void, close,
    connect, fcntl, getsockname, listen, recv, send, setsockopt, shutdown, sockaddr,
    sockaddr_in, sockaddr_in6, sockaddr_storage, socket, socklen_t, timeval,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;
use std::{io, mem};

/// Raw socket descriptor.
pub(crate) type RawSocket = std::os::fd::RawFd;

/// Flags passed to every `send(2)`.
///
/// Linux can suppress `SIGPIPE` per call; Apple targets use the
/// `SO_NOSIGPIPE` socket option instead (see [`sys_set_nosigpipe`]).
#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: c_int = 0;

/// Process-wide socket subsystem initialization. Nothing to do on Unix.
pub(crate) fn sys_init() {}

/// Maps a `-1` return code to the last OS error.
fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn setsockopt_int(fd: RawSocket, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };
    cvt(rc).map(|_| ())
}

/// Creates a blocking stream socket for the address family of `addr`.
pub(crate) fn sys_socket(addr: &SocketAddr) -> io::Result<RawSocket> {
    let domain = match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    };

    cvt(unsafe { socket(domain, SOCK_STREAM, 0) })
}

/// Switches a socket to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawSocket) -> io::Result<()> {
    let flags = cvt(unsafe { fcntl(fd, F_GETFL) })?;
    cvt(unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) }).map(|_| ())
}

/// Enables `SO_REUSEADDR`.
pub(crate) fn sys_set_reuseaddr(fd: RawSocket) -> io::Result<()> {
    setsockopt_int(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Disables Nagle's algorithm.
pub(crate) fn sys_set_nodelay(fd: RawSocket) -> io::Result<()> {
    setsockopt_int(fd, IPPROTO_TCP, TCP_NODELAY, 1)
}

/// Stops `send` on a dead peer from raising `SIGPIPE`.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub(crate) fn sys_set_nosigpipe(fd: RawSocket) -> io::Result<()> {
    setsockopt_int(fd, SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
}

/// Stops `send` on a dead peer from raising `SIGPIPE`.
///
/// Covered by `MSG_NOSIGNAL` on this target.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub(crate) fn sys_set_nosigpipe(_fd: RawSocket) -> io::Result<()> {
    Ok(())
}

/// Converts a receive timeout to a `timeval`. A zero duration would disable
/// the timeout, so it is clamped to one microsecond; seconds saturate at
/// `time_t::MAX`.
fn recv_timeval(timeout: Duration) -> timeval {
    let micros = timeout.as_micros().max(1);
    let secs = (micros / 1_000_000).min(libc::time_t::MAX as u128);

    timeval {
        tv_sec: secs as libc::time_t,
        tv_usec: (micros % 1_000_000) as libc::suseconds_t,
    }
}

/// Sets `SO_RCVTIMEO`.
pub(crate) fn sys_set_recv_timeout(fd: RawSocket, timeout: Duration) -> io::Result<()> {
    let tv = recv_timeval(timeout);

    let rc = unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_RCVTIMEO,
            &tv as *const _ as *const c_void,
            mem::size_of::<timeval>() as socklen_t,
        )
    };
    cvt(rc).map(|_| ())
}

/// Binds a socket to `addr`.
pub(crate) fn sys_bind(fd: RawSocket, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    cvt(unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) }).map(|_| ())
}

/// Marks a socket as listening.
pub(crate) fn sys_listen(fd: RawSocket, backlog: i32) -> io::Result<()> {
    cvt(unsafe { listen(fd, backlog) }).map(|_| ())
}

/// Accepts one pending connection.
pub(crate) fn sys_accept(fd: RawSocket) -> io::Result<(RawSocket, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client = cvt(unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    match storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client, addr)),
        Err(e) => {
            sys_close(client);
            Err(e)
        }
    }
}

/// Connects a blocking socket.
pub(crate) fn sys_connect(fd: RawSocket, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    cvt(unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) }).map(|_| ())
}

/// One `send(2)` call.
pub(crate) fn sys_send(fd: RawSocket, buffer: &[u8]) -> io::Result<usize> {
    let n = unsafe { send(fd, buffer.as_ptr() as *const c_void, buffer.len(), SEND_FLAGS) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// One `recv(2)` call. `Ok(0)` is an orderly shutdown by the peer.
pub(crate) fn sys_recv(fd: RawSocket, buffer: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { recv(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len(), 0) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Shuts down both directions of a socket.
pub(crate) fn sys_shutdown(fd: RawSocket) -> io::Result<()> {
    cvt(unsafe { shutdown(fd, SHUT_RDWR) }).map(|_| ())
}

/// Closes a socket descriptor.
pub(crate) fn sys_close(fd: RawSocket) {
    unsafe { close(fd) };
}

/// Local address of a socket.
pub(crate) fn sys_sockname(fd: RawSocket) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    storage_to_socketaddr(&storage)
}

/// Name of this host, as reported by `gethostname(2)`.
pub(crate) fn sys_hostname() -> io::Result<String> {
    let mut buf = [0 as c_char; 256];

    cvt(unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len() - 1) })?;

    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

fn storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let sin = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }

        AF_INET6 => {
            let sin6 = unsafe { &*(storage as *const _ as *const sockaddr_in6) };

            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }

        family => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported address family {family}"),
        )),
    }
}

fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sin.sin_family = AF_INET as _;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            mem::size_of::<sockaddr_in>()
        }

        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sin6.sin6_family = AF_INET6 as _;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();

            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, len as socklen_t)
}
