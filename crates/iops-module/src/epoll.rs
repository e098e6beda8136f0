//! `EpollPoller`: level-triggered epoll reactor.
//!
//! `epoll_data` carries the event token directly. The epoll descriptor is
//! either created here (owned, closed on drop) or supplied by the caller
//! (borrowed, never closed).
//!
//! One registration per descriptor: a second event object watching a
//! socket that is already registered on this epoll instance fails with
//! `InvalidArgument` and the first registration is left untouched.

use std::os::unix::io::RawFd;
use std::time::Duration;

use iops_core::{ErrorCode, EventMask, IoResult, Socket};

use crate::errmap;
use crate::event_loop::{EventLoop, Poller, Readiness};

/// Epoll-driven backend.
pub type EpollBackend = EventLoop<EpollPoller>;

/// Backend over a fresh epoll instance it owns.
pub fn backend() -> IoResult<EpollBackend> {
    Ok(EventLoop::new(EpollPoller::new()?))
}

/// Backend over a caller-owned epoll descriptor.
pub fn with_reactor(epfd: RawFd) -> EpollBackend {
    EventLoop::new(EpollPoller::from_raw(epfd))
}

const MAX_EVENTS: usize = 256;

pub struct EpollPoller {
    epfd: RawFd,
    owned: bool, // true if we created the fd (must close on drop)
    events: Vec<libc::epoll_event>,
}

impl EpollPoller {
    /// Create a new epoll instance and wrap it.
    ///
    /// The poller OWNS the fd and closes it on Drop.
    pub fn new() -> IoResult<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(errmap::normalize_last());
        }
        Ok(Self::wrap(epfd, true))
    }

    /// Wrap an existing epoll descriptor.
    ///
    /// Ownership of the fd remains with the caller. The poller
    /// does NOT close it on drop.
    pub fn from_raw(epfd: RawFd) -> Self {
        Self::wrap(epfd, false)
    }

    fn wrap(epfd: RawFd, owned: bool) -> Self {
        Self {
            epfd,
            owned,
            events: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
        }
    }

    /// `epoll_ctl`, returning the raw errno on failure.
    fn ctl(&self, op: libc::c_int, sock: Socket, mask: EventMask, token: u64) -> Result<(), i32> {
        let mut ev = libc::epoll_event {
            events: interest_bits(mask),
            u64: token,
        };
        if unsafe { libc::epoll_ctl(self.epfd, op, sock, &mut ev) } < 0 {
            return Err(nix::errno::Errno::last_raw());
        }
        Ok(())
    }
}

fn interest_bits(mask: EventMask) -> u32 {
    let mut bits = 0;
    if mask.contains(EventMask::READ) {
        bits |= (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;
    }
    if mask.contains(EventMask::WRITE) {
        bits |= libc::EPOLLOUT as u32;
    }
    bits
}

fn ready_mask(bits: u32) -> EventMask {
    let mut mask = EventMask::empty();
    if bits & (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDHUP) as u32 != 0 {
        mask |= EventMask::READ;
    }
    if bits & libc::EPOLLOUT as u32 != 0 {
        mask |= EventMask::WRITE;
    }
    if bits & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0 {
        mask |= EventMask::ERROR;
    }
    mask
}

/// Milliseconds for `epoll_wait`, rounded up.
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl Poller for EpollPoller {
    fn name(&self) -> &'static str {
        "epoll"
    }

    fn register(&mut self, sock: Socket, mask: EventMask, token: u64) -> IoResult<()> {
        match self.ctl(libc::EPOLL_CTL_ADD, sock, mask, token) {
            Ok(()) => Ok(()),
            // Owned by another event object
            Err(libc::EEXIST) => Err(ErrorCode::InvalidArgument),
            Err(errno) => Err(errmap::normalize(errno)),
        }
    }

    fn deregister(&mut self, sock: Socket, _token: u64) -> IoResult<()> {
        self.ctl(libc::EPOLL_CTL_DEL, sock, EventMask::empty(), 0)
            .map_err(errmap::normalize)
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> IoResult<()> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            return Err(errmap::normalize_last());
        }
        for ev in &self.events[..n as usize] {
            let (bits, token) = (ev.events, ev.u64);
            let mask = ready_mask(bits);
            if !mask.is_empty() {
                ready.push(Readiness { token, mask });
            }
        }
        Ok(())
    }

    fn reactor_fd(&self) -> Option<Socket> {
        Some(self.epfd)
    }

    fn owns_reactor(&self) -> bool {
        self.owned
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        if self.owned && self.epfd >= 0 {
            unsafe { libc::close(self.epfd); }
            self.epfd = -1;
        }
    }
}
