//! `BsdIo`: non-blocking BSD socket adapter.
//!
//! Every descriptor this adapter hands out is non-blocking from the moment
//! it exists. Failures are normalized through [`crate::errmap`] right after
//! the failing call; nothing here retries except `EINTR` inside the
//! closed-socket probe.

use std::io::{IoSlice, IoSliceMut};
use std::mem;
use std::net::SocketAddr;

use iops_core::{
    BsdProcs, ConnectStatus, ErrorCode, IoResult, SockCheckFlags, SockCheckProcs, SockCntlProcs,
    SockOption, SockStatus, Socket,
};

use crate::errmap;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const SEND_FLAGS: libc::c_int = 0;
    }
}

/// Stateless socket adapter shared by every builtin backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct BsdIo;

impl BsdIo {
    pub const fn new() -> Self {
        BsdIo
    }
}

/// Encode a `SocketAddr` as a C socket address.
pub(crate) fn sockaddr_of(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_scope_id = v6.scope_id();
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// Put an existing descriptor into non-blocking mode.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_nonblocking(fd: Socket) -> IoResult<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};

    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| errmap::normalize(e as i32))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| errmap::normalize(e as i32))?;
    Ok(())
}

fn getsockopt_int(sock: Socket, level: libc::c_int, name: libc::c_int) -> IoResult<libc::c_int> {
    let mut val: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(sock, level, name, &mut val as *mut _ as *mut libc::c_void, &mut len)
    };
    if rc != 0 {
        return Err(errmap::normalize_last());
    }
    Ok(val)
}

fn setsockopt_int(sock: Socket, level: libc::c_int, name: libc::c_int, val: libc::c_int) -> IoResult<()> {
    let rc = unsafe {
        libc::setsockopt(
            sock,
            level,
            name,
            &val as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(errmap::normalize_last());
    }
    Ok(())
}

fn option_level(option: SockOption) -> (libc::c_int, libc::c_int) {
    match option {
        SockOption::NoDelay => (libc::IPPROTO_TCP, libc::TCP_NODELAY),
        SockOption::KeepAlive => (libc::SOL_SOCKET, libc::SO_KEEPALIVE),
    }
}

#[inline]
fn byte_count(rc: isize) -> IoResult<usize> {
    if rc < 0 {
        Err(errmap::normalize_last())
    } else {
        Ok(rc as usize)
    }
}

impl BsdProcs for BsdIo {
    fn socket(&self, domain: i32, ty: i32, protocol: i32) -> IoResult<Socket> {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                let fd = unsafe {
                    libc::socket(domain, ty | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, protocol)
                };
                if fd < 0 {
                    return Err(errmap::normalize_last());
                }
                Ok(fd)
            } else {
                let fd = unsafe { libc::socket(domain, ty, protocol) };
                if fd < 0 {
                    return Err(errmap::normalize_last());
                }
                if let Err(code) = set_nonblocking(fd) {
                    unsafe { libc::close(fd); }
                    return Err(code);
                }
                Ok(fd)
            }
        }
    }

    fn connect(&self, sock: Socket, addr: &SocketAddr) -> IoResult<ConnectStatus> {
        let (storage, len) = sockaddr_of(addr);
        let rc = unsafe {
            libc::connect(sock, &storage as *const _ as *const libc::sockaddr, len)
        };
        if rc == 0 {
            return Ok(ConnectStatus::Connected);
        }
        match errmap::normalize_last() {
            ErrorCode::IsConnected => Ok(ConnectStatus::Connected),
            code if code.is_connect_pending() => Ok(ConnectStatus::Pending),
            code => Err(code),
        }
    }

    fn bind(&self, sock: Socket, addr: &SocketAddr) -> IoResult<()> {
        let (storage, len) = sockaddr_of(addr);
        let rc = unsafe { libc::bind(sock, &storage as *const _ as *const libc::sockaddr, len) };
        if rc != 0 {
            return Err(errmap::normalize_last());
        }
        Ok(())
    }

    fn listen(&self, sock: Socket, backlog: u32) -> IoResult<()> {
        let backlog = backlog.min(libc::c_int::MAX as u32) as libc::c_int;
        if unsafe { libc::listen(sock, backlog) } != 0 {
            return Err(errmap::normalize_last());
        }
        Ok(())
    }

    fn accept(&self, sock: Socket) -> IoResult<Socket> {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                let fd = unsafe {
                    libc::accept4(
                        sock,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                        libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    )
                };
                if fd < 0 {
                    return Err(errmap::normalize_last());
                }
                Ok(fd)
            } else {
                let fd = unsafe { libc::accept(sock, std::ptr::null_mut(), std::ptr::null_mut()) };
                if fd < 0 {
                    return Err(errmap::normalize_last());
                }
                if let Err(code) = set_nonblocking(fd) {
                    unsafe { libc::close(fd); }
                    return Err(code);
                }
                Ok(fd)
            }
        }
    }

    fn send(&self, sock: Socket, buf: &[u8]) -> IoResult<usize> {
        let rc = unsafe {
            libc::send(sock, buf.as_ptr() as *const libc::c_void, buf.len(), SEND_FLAGS)
        };
        byte_count(rc)
    }

    fn sendv(&self, sock: Socket, bufs: &[IoSlice<'_>]) -> IoResult<usize> {
        // IoSlice is ABI-compatible with iovec on unix
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;
        let rc = unsafe { libc::sendmsg(sock, &msg, SEND_FLAGS) };
        byte_count(rc)
    }

    fn recv(&self, sock: Socket, buf: &mut [u8]) -> IoResult<usize> {
        let rc = unsafe {
            libc::recv(sock, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        byte_count(rc)
    }

    fn recvv(&self, sock: Socket, bufs: &mut [IoSliceMut<'_>]) -> IoResult<usize> {
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = bufs.as_mut_ptr() as *mut libc::iovec;
        msg.msg_iovlen = bufs.len() as _;
        let rc = unsafe { libc::recvmsg(sock, &mut msg, 0) };
        byte_count(rc)
    }

    fn close(&self, sock: Socket) {
        unsafe { libc::close(sock); }
    }
}

impl SockCheckProcs for BsdIo {
    fn is_closed(&self, sock: Socket, flags: SockCheckFlags) -> SockStatus {
        let mut byte = 0u8;
        loop {
            let rc = unsafe {
                libc::recv(
                    sock,
                    &mut byte as *mut u8 as *mut libc::c_void,
                    1,
                    libc::MSG_PEEK | libc::MSG_DONTWAIT,
                )
            };
            if rc == 1 {
                return if flags.contains(SockCheckFlags::PEND_IS_ERROR) {
                    SockStatus::Closed
                } else {
                    SockStatus::Ok
                };
            }
            if rc == 0 {
                return SockStatus::Closed;
            }
            match errmap::normalize_last() {
                ErrorCode::Interrupted => continue,
                ErrorCode::WouldBlock => return SockStatus::Ok,
                ErrorCode::NotSocket => return SockStatus::Unknown,
                _ => return SockStatus::Closed,
            }
        }
    }
}

impl SockCntlProcs for BsdIo {
    fn cntl_get(&self, sock: Socket, option: SockOption) -> IoResult<bool> {
        let (level, name) = option_level(option);
        getsockopt_int(sock, level, name).map(|v| v != 0)
    }

    fn cntl_set(&self, sock: Socket, option: SockOption, value: bool) -> IoResult<()> {
        let (level, name) = option_level(option);
        setsockopt_int(sock, level, name, value as libc::c_int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn is_nonblocking(fd: Socket) -> bool {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        flags >= 0 && flags & libc::O_NONBLOCK != 0
    }

    fn local_port(fd: Socket) -> u16 {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
        };
        assert_eq!(rc, 0);
        let sin = unsafe { &*(&storage as *const _ as *const libc::sockaddr_in) };
        u16::from_be(sin.sin_port)
    }

    fn connect_loopback(bsd: &BsdIo, addr: SocketAddr) -> Socket {
        let fd = bsd.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        for _ in 0..200 {
            match bsd.connect(fd, &addr).unwrap() {
                ConnectStatus::Connected => return fd,
                ConnectStatus::Pending => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("loopback connect did not complete");
    }

    #[test]
    fn socket_is_nonblocking_on_return() {
        let bsd = BsdIo::new();
        let fd = bsd.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        assert!(is_nonblocking(fd));
        let mut buf = [0u8; 8];
        // Unconnected: must fail immediately, not block
        assert!(bsd.recv(fd, &mut buf).is_err());
        assert!(bsd.send(fd, b"x").is_err());
        bsd.close(fd);
    }

    #[test]
    fn socket_rejects_bad_family() {
        let bsd = BsdIo::new();
        assert!(bsd.socket(-1, libc::SOCK_STREAM, 0).is_err());
    }

    #[test]
    fn recv_distinguishes_would_block_and_close() {
        let bsd = BsdIo::new();
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let fd = a.as_raw_fd();
        let mut buf = [0u8; 16];

        assert_eq!(bsd.recv(fd, &mut buf), Err(ErrorCode::WouldBlock));

        b.write_all(b"hello").unwrap();
        assert_eq!(bsd.recv(fd, &mut buf), Ok(5));
        assert_eq!(&buf[..5], b"hello");

        drop(b);
        assert_eq!(bsd.recv(fd, &mut buf), Ok(0));
    }

    #[test]
    fn vectored_send_and_recv() {
        let bsd = BsdIo::new();
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();

        let n = bsd
            .sendv(a.as_raw_fd(), &[IoSlice::new(b"abc"), IoSlice::new(b"defg")])
            .unwrap();
        assert_eq!(n, 7);

        let mut first = [0u8; 2];
        let mut second = [0u8; 8];
        let n = bsd
            .recvv(
                b.as_raw_fd(),
                &mut [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)],
            )
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(&first, b"ab");
        assert_eq!(&second[..5], b"cdefg");
    }

    #[test]
    fn send_to_closed_peer_does_not_raise_sigpipe() {
        let bsd = BsdIo::new();
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        drop(b);
        let err = bsd.send(a.as_raw_fd(), b"x").unwrap_err();
        assert!(matches!(err, ErrorCode::BrokenPipe | ErrorCode::ConnReset));
    }

    #[test]
    fn connect_send_recv_over_loopback() {
        let bsd = BsdIo::new();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let fd = connect_loopback(&bsd, addr);
        let (mut peer, _) = listener.accept().unwrap();

        assert_eq!(bsd.send(fd, b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").unwrap();
        let mut got = Vec::new();
        let mut tmp = [0u8; 4];
        for _ in 0..200 {
            match bsd.recv(fd, &mut tmp) {
                Ok(n) => {
                    got.extend_from_slice(&tmp[..n]);
                    if got.len() == 4 {
                        break;
                    }
                }
                Err(ErrorCode::WouldBlock) => std::thread::sleep(Duration::from_millis(5)),
                Err(e) => panic!("recv failed: {e}"),
            }
        }
        assert_eq!(got, b"pong");
        bsd.close(fd);
    }

    #[test]
    fn connect_refused_is_reported() {
        let bsd = BsdIo::new();
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let fd = bsd.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let mut outcome = bsd.connect(fd, &addr);
        for _ in 0..200 {
            if outcome != Ok(ConnectStatus::Pending) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
            outcome = bsd.connect(fd, &addr);
        }
        assert!(outcome.is_err());
        bsd.close(fd);
    }

    #[test]
    fn listen_and_accept_nonblocking() {
        let bsd = BsdIo::new();
        let lfd = bsd.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        bsd.bind(lfd, &"127.0.0.1:0".parse().unwrap()).unwrap();
        bsd.listen(lfd, 16).unwrap();
        assert_eq!(bsd.accept(lfd), Err(ErrorCode::WouldBlock));

        let port = local_port(lfd);
        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut accepted = Err(ErrorCode::WouldBlock);
        for _ in 0..200 {
            accepted = bsd.accept(lfd);
            if accepted != Err(ErrorCode::WouldBlock) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let cfd = accepted.unwrap();
        assert!(is_nonblocking(cfd));
        bsd.close(cfd);
        bsd.close(lfd);
    }

    #[test]
    fn is_closed_probe() {
        let bsd = BsdIo::new();
        let (a, mut b) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();

        assert_eq!(bsd.is_closed(fd, SockCheckFlags::empty()), SockStatus::Ok);

        b.write_all(b"!").unwrap();
        assert_eq!(bsd.is_closed(fd, SockCheckFlags::empty()), SockStatus::Ok);
        assert_eq!(bsd.is_closed(fd, SockCheckFlags::PEND_IS_ERROR), SockStatus::Closed);

        // Probe must not consume the pending byte
        let mut buf = [0u8; 1];
        assert_eq!(bsd.recv(fd, &mut buf), Ok(1));

        drop(b);
        assert_eq!(bsd.is_closed(fd, SockCheckFlags::empty()), SockStatus::Closed);
    }

    #[test]
    fn socket_options_roundtrip() {
        let bsd = BsdIo::new();
        let fd = bsd.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();

        bsd.cntl_set(fd, SockOption::NoDelay, true).unwrap();
        assert!(bsd.cntl_get(fd, SockOption::NoDelay).unwrap());
        bsd.cntl_set(fd, SockOption::NoDelay, false).unwrap();
        assert!(!bsd.cntl_get(fd, SockOption::NoDelay).unwrap());

        bsd.cntl_set(fd, SockOption::KeepAlive, true).unwrap();
        assert!(bsd.cntl_get(fd, SockOption::KeepAlive).unwrap());

        bsd.close(fd);
        assert_eq!(bsd.cntl_get(-1, SockOption::NoDelay), Err(ErrorCode::BadDescriptor));
    }
}
