//! `select(2)` poller, the portable fallback.
//!
//! Interest lives in a plain map and the fd sets are rebuilt for every
//! wait. Descriptors at or above `FD_SETSIZE` cannot be represented and
//! are rejected at registration.

use std::collections::HashMap;
use std::time::Duration;

use iops_core::{ErrorCode, EventMask, IoResult, Socket};

use crate::errmap;
use crate::event_loop::{EventLoop, Poller, Readiness};

/// Select-driven backend.
pub type SelectBackend = EventLoop<SelectPoller>;

/// Build a select backend. It has no reactor handle to own or borrow.
pub fn backend() -> SelectBackend {
    EventLoop::new(SelectPoller::new())
}

#[derive(Debug, Default)]
pub struct SelectPoller {
    interest: HashMap<u64, (Socket, EventMask)>,
}

impl SelectPoller {
    pub fn new() -> Self {
        Self::default()
    }
}

fn timeval_of(timeout: Duration) -> libc::timeval {
    // Round up so short timer waits do not spin; tv_usec must stay below 1s
    let usecs = timeout.as_nanos().div_ceil(1000);
    libc::timeval {
        tv_sec: (usecs / 1_000_000).min(libc::time_t::MAX as u128) as libc::time_t,
        tv_usec: (usecs % 1_000_000) as libc::suseconds_t,
    }
}

impl Poller for SelectPoller {
    fn name(&self) -> &'static str {
        "select"
    }

    fn register(&mut self, sock: Socket, mask: EventMask, token: u64) -> IoResult<()> {
        if sock < 0 || sock as usize >= libc::FD_SETSIZE as usize {
            return Err(ErrorCode::InvalidArgument);
        }
        self.interest.insert(token, (sock, mask));
        Ok(())
    }

    fn deregister(&mut self, _sock: Socket, token: u64) -> IoResult<()> {
        self.interest.remove(&token);
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> IoResult<()> {
        let mut rset: libc::fd_set = unsafe { std::mem::zeroed() };
        let mut wset: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut rset);
            libc::FD_ZERO(&mut wset);
        }

        let mut max_fd = -1;
        for &(fd, mask) in self.interest.values() {
            if mask.contains(EventMask::READ) {
                unsafe { libc::FD_SET(fd, &mut rset) };
            }
            if mask.contains(EventMask::WRITE) {
                unsafe { libc::FD_SET(fd, &mut wset) };
            }
            max_fd = max_fd.max(fd);
        }

        let mut tv = timeout.map(timeval_of);
        let tv_ptr = tv
            .as_mut()
            .map_or(std::ptr::null_mut(), |tv| tv as *mut libc::timeval);

        let rc = unsafe {
            libc::select(max_fd + 1, &mut rset, &mut wset, std::ptr::null_mut(), tv_ptr)
        };
        if rc < 0 {
            return Err(errmap::normalize_last());
        }
        if rc == 0 {
            return Ok(());
        }

        for (&token, &(fd, mask)) in &self.interest {
            let mut hit = EventMask::empty();
            if mask.contains(EventMask::READ) && unsafe { libc::FD_ISSET(fd, &rset) } {
                hit |= EventMask::READ;
            }
            if mask.contains(EventMask::WRITE) && unsafe { libc::FD_ISSET(fd, &wset) } {
                hit |= EventMask::WRITE;
            }
            if !hit.is_empty() {
                ready.push(Readiness { token, mask: hit });
            }
        }
        Ok(())
    }
}
