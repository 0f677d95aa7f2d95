//! Windows platform layer.
//!
//! Mirrors [`super::unix`] function for function on top of WinSock.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Once;
use std::time::Duration;
use std::{io, mem};

use windows_sys::Win32::Networking::WinSock::{
    AF_INET, AF_INET6, FIONBIO, INVALID_SOCKET, IPPROTO_TCP, SD_BOTH, SO_RCVTIMEO, SO_REUSEADDR,
    SOCK_STREAM, SOCKADDR, SOCKADDR_IN, SOCKADDR_IN6, SOCKADDR_STORAGE, SOCKET, SOCKET_ERROR,
    SOL_SOCKET, TCP_NODELAY, WSADATA, WSAStartup, accept, bind, closesocket, connect,
    gethostname, getsockname, ioctlsocket, listen, recv, send, setsockopt,
    shutdown, socket,
};

/// Raw socket descriptor.
pub(crate) type RawSocket = std::os::windows::io::RawSocket;

static WINSOCK_INIT: Once = Once::new();

/// Initializes WinSock 2.2 once per process.
pub(crate) fn sys_init() {
    WINSOCK_INIT.call_once(|| unsafe {
        let mut data: WSADATA = mem::zeroed();
        let rc = WSAStartup(0x0202, &mut data);
        assert_eq!(rc, 0, "WSAStartup failed: {rc}");
    });
}

fn cvt(rc: i32) -> io::Result<i32> {
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn setsockopt_bytes(fd: RawSocket, level: i32, name: i32, value: &[u8]) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd as SOCKET,
            level,
            name,
            value.as_ptr(),
            value.len() as i32,
        )
    };
    cvt(rc).map(|_| ())
}

/// Creates a blocking stream socket for the address family of `addr`.
pub(crate) fn sys_socket(addr: &SocketAddr) -> io::Result<RawSocket> {
    sys_init();

    let domain = match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    };

    let fd = unsafe { socket(domain as i32, SOCK_STREAM, 0) };
    if fd == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    Ok(fd as RawSocket)
}

/// Switches a socket to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawSocket) -> io::Result<()> {
    let mut mode: u32 = 1;
    cvt(unsafe { ioctlsocket(fd as SOCKET, FIONBIO, &mut mode) }).map(|_| ())
}

/// Enables `SO_REUSEADDR`.
pub(crate) fn sys_set_reuseaddr(fd: RawSocket) -> io::Result<()> {
    setsockopt_bytes(fd, SOL_SOCKET, SO_REUSEADDR, &1i32.to_ne_bytes())
}

/// Disables Nagle's algorithm.
pub(crate) fn sys_set_nodelay(fd: RawSocket) -> io::Result<()> {
    setsockopt_bytes(fd, IPPROTO_TCP, TCP_NODELAY, &1i32.to_ne_bytes())
}

/// WinSock never raises signals on a dead peer.
pub(crate) fn sys_set_nosigpipe(_fd: RawSocket) -> io::Result<()> {
    Ok(())
}

/// Sets `SO_RCVTIMEO` in milliseconds, clamped to at least one.
pub(crate) fn sys_set_recv_timeout(fd: RawSocket, timeout: Duration) -> io::Result<()> {
    let millis = timeout.as_millis().clamp(1, u32::MAX as u128) as u32;
    setsockopt_bytes(fd, SOL_SOCKET, SO_RCVTIMEO, &millis.to_ne_bytes())
}

/// Binds a socket to `addr`.
pub(crate) fn sys_bind(fd: RawSocket, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    cvt(unsafe { bind(fd as SOCKET, &storage as *const _ as *const SOCKADDR, len) }).map(|_| ())
}

/// Marks a socket as listening.
pub(crate) fn sys_listen(fd: RawSocket, backlog: i32) -> io::Result<()> {
    cvt(unsafe { listen(fd as SOCKET, backlog) }).map(|_| ())
}

/// Accepts one pending connection.
pub(crate) fn sys_accept(fd: RawSocket) -> io::Result<(RawSocket, SocketAddr)> {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;

    let client = unsafe {
        accept(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        )
    };
    if client == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    match storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client as RawSocket, addr)),
        Err(e) => {
            sys_close(client as RawSocket);
            Err(e)
        }
    }
}

/// Connects a blocking socket.
pub(crate) fn sys_connect(fd: RawSocket, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    cvt(unsafe { connect(fd as SOCKET, &storage as *const _ as *const SOCKADDR, len) })
        .map(|_| ())
}

/// One `send` call.
pub(crate) fn sys_send(fd: RawSocket, buffer: &[u8]) -> io::Result<usize> {
    let len = buffer.len().min(i32::MAX as usize) as i32;
    cvt(unsafe { send(fd as SOCKET, buffer.as_ptr(), len, 0) }).map(|n| n as usize)
}

/// One `recv` call. `Ok(0)` is an orderly shutdown by the peer.
pub(crate) fn sys_recv(fd: RawSocket, buffer: &mut [u8]) -> io::Result<usize> {
    let len = buffer.len().min(i32::MAX as usize) as i32;
    cvt(unsafe { recv(fd as SOCKET, buffer.as_mut_ptr(), len, 0) }).map(|n| n as usize)
}

/// Shuts down both directions of a socket.
pub(crate) fn sys_shutdown(fd: RawSocket) -> io::Result<()> {
    cvt(unsafe { shutdown(fd as SOCKET, SD_BOTH) }).map(|_| ())
}

/// Closes a socket.
pub(crate) fn sys_close(fd: RawSocket) {
    unsafe { closesocket(fd as SOCKET) };
}

/// Local address of a socket.
pub(crate) fn sys_sockname(fd: RawSocket) -> io::Result<SocketAddr> {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;

    cvt(unsafe {
        getsockname(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        )
    })?;
    storage_to_socketaddr(&storage)
}

/// Name of this host.
pub(crate) fn sys_hostname() -> io::Result<String> {
    sys_init();

    let mut buf = [0u8; 256];
    cvt(unsafe { gethostname(buf.as_mut_ptr(), buf.len() as i32 - 1) })?;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn storage_to_socketaddr(storage: &SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
    unsafe {
        match storage.ss_family {
            AF_INET => {
                let sin = &*(storage as *const _ as *const SOCKADDR_IN);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.S_un.S_addr));

                Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
            }

            AF_INET6 => {
                let sin6 = &*(storage as *const _ as *const SOCKADDR_IN6);

                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(sin6.sin6_addr.u.Byte),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.Anonymous.sin6_scope_id,
                )))
            }

            family => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported address family {family}"),
            )),
        }
    }
}

fn socketaddr_to_storage(addr: &SocketAddr) -> (SOCKADDR_STORAGE, i32) {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut SOCKADDR_IN) };
            sin.sin_family = AF_INET;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.S_un.S_addr = u32::from(*v4.ip()).to_be();

            mem::size_of::<SOCKADDR_IN>()
        }

        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut SOCKADDR_IN6) };
            sin6.sin6_family = AF_INET6;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.u.Byte = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.Anonymous.sin6_scope_id = v6.scope_id();

            mem::size_of::<SOCKADDR_IN6>()
        }
    };

    (storage, len as i32)
}
