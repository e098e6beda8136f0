//! Procedure traits.
//!
//! A backend is split into the same four sub-tables the client has always
//! consumed: loop control, timers, socket readiness events, and BSD-style
//! socket calls. Two socket members are optional and version-gated:
//! closed-socket probing and socket option control.
//!
//! The client never calls a backend directly; it goes through the
//! `ProcedureTable` handed out by the `iops` crate, which only exposes the
//! gated members when the negotiated version covers them.

use std::io::{IoSlice, IoSliceMut};
use std::net::SocketAddr;
use std::rc::Rc;

use crate::error::{IoResult, Result};
use crate::handle::{EventId, TimerId};
use crate::socket::{ConnectStatus, EventMask, SockCheckFlags, SockOption, SockStatus, Socket};

/// Completion callback for events and timers.
///
/// Receives the reactor that dispatched it, so it can stop the loop,
/// re-arm itself or change interest without holding a separate handle.
/// Timers receive [`crate::socket::INVALID_SOCKET`] and an empty mask.
///
/// Identity (for the watch no-op check) is the `Rc` allocation: clones of
/// one `IoCallback` are the same callback, two separately built closures
/// are not.
pub type IoCallback = Rc<dyn Fn(&mut dyn Reactor, Socket, EventMask)>;

/// Wrap a closure as an [`IoCallback`].
pub fn callback<F>(f: F) -> IoCallback
where
    F: Fn(&mut dyn Reactor, Socket, EventMask) + 'static,
{
    Rc::new(f)
}

/// Same-allocation comparison, ignoring vtable pointers.
#[inline]
pub fn same_callback(a: &IoCallback, b: &IoCallback) -> bool {
    Rc::as_ptr(a) as *const u8 == Rc::as_ptr(b) as *const u8
}

/// Loop control.
pub trait LoopProcs {
    /// Dispatch until [`LoopProcs::stop`] is called or no event/timer is
    /// armed.
    fn start(&mut self) -> Result<()>;

    /// Ask the current (or next) `start` to return after its current pass.
    fn stop(&mut self);

    /// One non-blocking pass. A no-op when called from inside `start`.
    fn tick(&mut self) -> Result<()>;
}

/// Timer object lifecycle.
pub trait TimerProcs {
    fn timer_create(&mut self) -> Result<TimerId>;

    /// Arm (or re-arm) `timer` to fire `usecs` microseconds from now.
    fn timer_schedule(&mut self, timer: TimerId, usecs: u32, callback: IoCallback) -> Result<()>;

    /// Disarm without destroying. No-op on unarmed timers.
    fn timer_cancel(&mut self, timer: TimerId);

    /// Disarm and free. Stale IDs are ignored.
    fn timer_destroy(&mut self, timer: TimerId);
}

/// Event object lifecycle.
pub trait EventProcs {
    fn event_create(&mut self) -> Result<EventId>;

    /// Bind `event` to `sock` with interest `mask`.
    ///
    /// An identical `(sock, mask, callback)` re-watch is a no-op and does
    /// not touch the backend. An empty mask is equivalent to `event_cancel`.
    fn event_watch(
        &mut self,
        event: EventId,
        sock: Socket,
        mask: EventMask,
        callback: IoCallback,
    ) -> Result<()>;

    /// Stop delivery; the object stays usable for another `watch`.
    fn event_cancel(&mut self, event: EventId);

    /// Cancel and free. Stale IDs are ignored.
    fn event_destroy(&mut self, event: EventId);
}

/// What a callback can reach while it runs.
pub trait Reactor: LoopProcs + TimerProcs + EventProcs {}

impl<T: LoopProcs + TimerProcs + EventProcs + ?Sized> Reactor for T {}

/// Non-blocking BSD socket calls.
///
/// Every call returns immediately. Transient conditions come back as
/// [`crate::ErrorCode::WouldBlock`] / [`crate::ErrorCode::Interrupted`];
/// `recv`/`recvv` return `Ok(0)` on orderly peer shutdown.
pub trait BsdProcs {
    /// Create a socket that is non-blocking from the start.
    fn socket(&self, domain: i32, ty: i32, protocol: i32) -> IoResult<Socket>;

    fn connect(&self, sock: Socket, addr: &SocketAddr) -> IoResult<ConnectStatus>;

    fn bind(&self, sock: Socket, addr: &SocketAddr) -> IoResult<()>;

    fn listen(&self, sock: Socket, backlog: u32) -> IoResult<()>;

    /// Accept one pending connection; the new socket is non-blocking.
    fn accept(&self, sock: Socket) -> IoResult<Socket>;

    fn send(&self, sock: Socket, buf: &[u8]) -> IoResult<usize>;

    fn sendv(&self, sock: Socket, bufs: &[IoSlice<'_>]) -> IoResult<usize>;

    fn recv(&self, sock: Socket, buf: &mut [u8]) -> IoResult<usize>;

    fn recvv(&self, sock: Socket, bufs: &mut [IoSliceMut<'_>]) -> IoResult<usize>;

    /// Unconditional close.
    fn close(&self, sock: Socket);
}

/// Closed-socket probing (procedure version >= 3).
pub trait SockCheckProcs {
    fn is_closed(&self, sock: Socket, flags: SockCheckFlags) -> SockStatus;
}

/// Socket option control (procedure version >= 4).
pub trait SockCntlProcs {
    fn cntl_get(&self, sock: Socket, option: SockOption) -> IoResult<bool>;

    fn cntl_set(&self, sock: Socket, option: SockOption, value: bool) -> IoResult<()>;
}

/// Counters kept by every backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Registrations pushed to the underlying reactor.
    pub registrations: u64,
    /// Deregistrations pushed to the underlying reactor.
    pub deregistrations: u64,
    /// Event callbacks invoked.
    pub event_dispatches: u64,
    /// Timer callbacks invoked.
    pub timer_fires: u64,
    /// Event objects currently allocated.
    pub live_events: usize,
    /// Timer objects currently allocated.
    pub live_timers: usize,
}

/// A complete backend: the four sub-tables plus introspection.
pub trait IoBackend: LoopProcs + TimerProcs + EventProcs {
    /// Short registry name (`"epoll"`, `"select"`, ...).
    fn name(&self) -> &'static str;

    /// Highest procedure version this backend populates.
    fn procs_version(&self) -> u32;

    fn bsd(&self) -> &dyn BsdProcs;

    fn sockcheck(&self) -> Option<&dyn SockCheckProcs> {
        None
    }

    fn sockcntl(&self) -> Option<&dyn SockCntlProcs> {
        None
    }

    fn stats(&self) -> BackendStats;

    /// Native reactor descriptor, if the backend has one.
    fn reactor_fd(&self) -> Option<Socket> {
        None
    }

    /// Whether dropping the backend releases the reactor handle.
    fn owns_reactor(&self) -> bool {
        true
    }
}
