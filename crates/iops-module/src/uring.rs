//! `UringPoller`: readiness through io_uring poll requests.
//!
//! Each registration is a one-shot `PollAdd` keyed by a fresh serial. When
//! its completion arrives and the registration is still current, the poll
//! is re-armed with a new serial, which gives level-triggered behaviour.
//! Completions for serials that are no longer current (deregistered or
//! replaced) are dropped.
//!
//! Bounded waits use `IORING_ENTER_EXT_ARG` when the kernel has it and a
//! `Timeout` request otherwise. A `Timeout` still pending when its wait
//! returns is removed before `wait` does, so it cannot cut a later wait
//! short.

use std::collections::HashMap;
use std::time::Duration;

use io_uring::{opcode, squeue, types, IoUring};

use iops_core::{EventMask, IoResult, Socket};

use crate::errmap;
use crate::event_loop::{EventLoop, Poller, Readiness};

/// io_uring-driven backend.
pub type UringBackend = EventLoop<UringPoller>;

/// Backend over a fresh ring it owns.
pub fn backend() -> IoResult<UringBackend> {
    Ok(EventLoop::new(UringPoller::new(DEFAULT_ENTRIES)?))
}

const DEFAULT_ENTRIES: u32 = 256;

/// user_data of internal requests whose completions carry no readiness.
const TIMEOUT_USER_DATA: u64 = u64::MAX;
const REMOVE_USER_DATA: u64 = u64::MAX - 1;

struct Registration {
    fd: Socket,
    mask: EventMask,
    serial: u64,
}

pub struct UringPoller {
    ring: IoUring,
    ext_arg: bool,
    next_serial: u64,
    /// serial -> token for polls in flight
    inflight: HashMap<u64, u64>,
    /// token -> current registration
    regs: HashMap<u64, Registration>,
    /// A `Timeout` request is queued and has not completed
    timeout_pending: bool,
    cqes: Vec<(u64, i32)>,
}

fn io_err(err: std::io::Error) -> iops_core::ErrorCode {
    errmap::from_io_error(&err)
}

fn poll_bits(mask: EventMask) -> u32 {
    let mut bits = 0;
    if mask.contains(EventMask::READ) {
        bits |= (libc::POLLIN | libc::POLLRDHUP) as u32;
    }
    if mask.contains(EventMask::WRITE) {
        bits |= libc::POLLOUT as u32;
    }
    bits
}

fn ready_mask(revents: u32) -> EventMask {
    let mut mask = EventMask::empty();
    if revents & (libc::POLLIN | libc::POLLPRI | libc::POLLRDHUP) as u32 != 0 {
        mask |= EventMask::READ;
    }
    if revents & libc::POLLOUT as u32 != 0 {
        mask |= EventMask::WRITE;
    }
    if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) as u32 != 0 {
        mask |= EventMask::ERROR;
    }
    mask
}

impl UringPoller {
    pub fn new(entries: u32) -> IoResult<Self> {
        let ring = IoUring::new(entries).map_err(io_err)?;
        let ext_arg = ring.params().is_feature_ext_arg();
        Ok(Self {
            ring,
            ext_arg,
            next_serial: 0,
            inflight: HashMap::new(),
            regs: HashMap::new(),
            timeout_pending: false,
            cqes: Vec::with_capacity(entries as usize),
        })
    }

    /// Queue one SQE, flushing the submission queue if it is full.
    fn push(&mut self, sqe: &squeue::Entry) -> IoResult<()> {
        loop {
            // SAFETY: poll, remove and nop requests reference no user memory; the
            // Timeout timespec outlives the submit that consumes it.
            if unsafe { self.ring.submission().push(sqe) }.is_ok() {
                return Ok(());
            }
            self.ring.submit().map_err(io_err)?;
        }
    }

    fn arm(&mut self, token: u64, fd: Socket, mask: EventMask) -> IoResult<u64> {
        let serial = self.next_serial;
        self.next_serial += 1;
        let sqe = opcode::PollAdd::new(types::Fd(fd), poll_bits(mask))
            .build()
            .user_data(serial);
        self.push(&sqe)?;
        self.inflight.insert(serial, token);
        Ok(serial)
    }

    fn disarm(&mut self, serial: u64) -> IoResult<()> {
        self.inflight.remove(&serial);
        let sqe = opcode::PollRemove::new(serial)
            .build()
            .user_data(REMOVE_USER_DATA);
        self.push(&sqe)
    }

    fn submit_and_wait(&mut self, timeout: Option<Duration>) -> IoResult<()> {
        let submitted = match timeout {
            Some(t) if t.is_zero() => self.ring.submit(),
            Some(t) => {
                let ts = types::Timespec::new().sec(t.as_secs()).nsec(t.subsec_nanos());
                if self.ext_arg {
                    let args = types::SubmitArgs::new().timespec(&ts);
                    self.ring.submitter().submit_with_args(1, &args)
                } else {
                    let sqe = opcode::Timeout::new(&ts)
                        .build()
                        .user_data(TIMEOUT_USER_DATA);
                    self.push(&sqe)?;
                    self.timeout_pending = true;
                    self.ring.submit_and_wait(1)
                }
            }
            None => self.ring.submit_and_wait(1),
        };
        match submitted {
            Ok(_) => Ok(()),
            Err(err) => match err.raw_os_error() {
                // Timed out, interrupted, or CQ full: drain what is there
                Some(libc::ETIME) | Some(libc::EBUSY) => Ok(()),
                Some(libc::EINTR) => Err(iops_core::ErrorCode::Interrupted),
                _ => Err(io_err(err)),
            },
        }
    }

    /// Remove the pending `Timeout`, if it has not fired yet.
    fn cancel_timeout(&mut self) -> IoResult<()> {
        self.timeout_pending = false;
        let sqe = opcode::TimeoutRemove::new(TIMEOUT_USER_DATA)
            .build()
            .user_data(REMOVE_USER_DATA);
        self.push(&sqe)?;
        self.ring.submit().map_err(io_err)?;
        Ok(())
    }

    /// Drain the completion queue into `ready`, re-arming live polls.
    fn collect(&mut self, ready: &mut Vec<Readiness>) -> IoResult<()> {
        self.cqes.clear();
        self.cqes
            .extend(self.ring.completion().map(|cqe| (cqe.user_data(), cqe.result())));

        for i in 0..self.cqes.len() {
            let (serial, res) = self.cqes[i];
            if serial == TIMEOUT_USER_DATA {
                self.timeout_pending = false;
                continue;
            }
            let token = match self.inflight.remove(&serial) {
                Some(token) => token,
                None => continue,
            };
            let (fd, mask) = match self.regs.get(&token) {
                Some(reg) if reg.serial == serial => (reg.fd, reg.mask),
                _ => continue,
            };
            let hit = if res < 0 {
                EventMask::ERROR
            } else {
                ready_mask(res as u32)
            };
            if !hit.is_empty() {
                ready.push(Readiness { token, mask: hit });
            }
            let next = self.arm(token, fd, mask)?;
            if let Some(reg) = self.regs.get_mut(&token) {
                reg.serial = next;
            }
        }
        Ok(())
    }
}

impl Poller for UringPoller {
    fn name(&self) -> &'static str {
        "uring"
    }

    fn register(&mut self, sock: Socket, mask: EventMask, token: u64) -> IoResult<()> {
        if let Some(old) = self.regs.remove(&token) {
            self.disarm(old.serial)?;
        }
        let serial = self.arm(token, sock, mask)?;
        self.regs.insert(token, Registration { fd: sock, mask, serial });
        Ok(())
    }

    fn deregister(&mut self, _sock: Socket, token: u64) -> IoResult<()> {
        match self.regs.remove(&token) {
            Some(reg) => self.disarm(reg.serial),
            None => Ok(()),
        }
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> IoResult<()> {
        let waited = self.submit_and_wait(timeout);
        self.collect(ready)?;
        if self.timeout_pending {
            // Woken by another completion; the removal completes inline
            self.cancel_timeout()?;
            self.collect(ready)?;
        }
        waited
    }

    fn reactor_fd(&self) -> Option<Socket> {
        use std::os::unix::io::AsRawFd;
        Some(self.ring.as_raw_fd())
    }
}
