//! Shared dispatch core for every builtin backend.
//!
//! `EventLoop<P>` owns the event and timer objects, the loop state and the
//! counters; `P` is the readiness source (select, epoll, io_uring). A
//! backend is just `EventLoop<SomePoller>`.
//!
//! # Dispatch pass
//!
//! 1. Wait on the poller (bounded by the next armed timer deadline).
//! 2. For each readiness record, map its registration token back to the
//!    event and check that registration is still the current one with an
//!    overlapping mask. Every register hands the poller a fresh token, so
//!    cancels, destroys and re-watches made by earlier callbacks in the
//!    same pass suppress delivery of records taken before them.
//! 3. Collect every timer whose deadline is at or before the pass instant,
//!    then fire them in `(deadline, seq)` order, re-checking each one is
//!    still armed with the same sequence.
//!
//! Callbacks run on the calling thread with `&mut dyn Reactor` pointing
//! back at this loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use iops_core::{
    same_callback, Arena, BackendStats, BsdProcs, ErrorCode, EventId, EventMask, EventProcs,
    IoBackend, IoCallback, IoResult, IopsError, LoopProcs, Result, SockCheckProcs,
    SockCntlProcs, Socket, TimerId, TimerProcs, INVALID_SOCKET, PROCS_VERSION,
};
use iops_core::ktrace;

use crate::bsdio::BsdIo;
use crate::timer_queue::TimerQueue;

/// One readiness record produced by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub mask: EventMask,
}

/// Readiness source behind an [`EventLoop`].
///
/// `token` is opaque to the poller and must be reported back verbatim.
/// `mask` is never empty and never contains `ERROR`; error conditions are
/// always reported.
pub trait Poller {
    fn name(&self) -> &'static str;

    fn register(&mut self, sock: Socket, mask: EventMask, token: u64) -> IoResult<()>;

    fn deregister(&mut self, sock: Socket, token: u64) -> IoResult<()>;

    /// Wait up to `timeout` (`None` = indefinitely, zero = poll) and append
    /// readiness to `ready`. An interrupted wait returns
    /// `Err(ErrorCode::Interrupted)`.
    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> IoResult<()>;

    fn reactor_fd(&self) -> Option<Socket> {
        None
    }

    fn owns_reactor(&self) -> bool {
        true
    }
}

struct EventSlot {
    sock: Socket,
    mask: EventMask,
    callback: Option<IoCallback>,
    /// Poller token of the live registration
    reg: Option<u64>,
}

impl EventSlot {
    fn detached() -> Self {
        Self {
            sock: INVALID_SOCKET,
            mask: EventMask::empty(),
            callback: None,
            reg: None,
        }
    }
}

#[derive(Default)]
struct TimerSlot {
    /// Sequence of the live heap entry, if armed
    armed: Option<u64>,
    callback: Option<IoCallback>,
}

/// Generic backend: event/timer objects + loop control over a [`Poller`].
pub struct EventLoop<P: Poller> {
    poller: P,
    bsd: BsdIo,
    events: Arena<EventSlot>,
    timers: Arena<TimerSlot>,
    queue: TimerQueue<TimerId>,

    /// Live poller tokens; never reused within a loop
    tokens: HashMap<u64, EventId>,
    next_token: u64,

    /// Scratch buffers reused across passes
    ready: Vec<Readiness>,
    expired: Vec<(TimerId, u64)>,

    /// True whenever no `start`/`tick` is running
    suspended: bool,
    stop_requested: bool,

    watching: usize,
    armed: usize,

    registrations: u64,
    deregistrations: u64,
    event_dispatches: u64,
    timer_fires: u64,
}

impl<P: Poller> EventLoop<P> {
    pub fn new(poller: P) -> Self {
        ktrace!("{} backend created", poller.name());
        Self {
            poller,
            bsd: BsdIo::new(),
            events: Arena::new(),
            timers: Arena::new(),
            queue: TimerQueue::new(),
            tokens: HashMap::new(),
            next_token: 0,
            ready: Vec::with_capacity(64),
            expired: Vec::new(),
            suspended: true,
            stop_requested: false,
            watching: 0,
            armed: 0,
            registrations: 0,
            deregistrations: 0,
            event_dispatches: 0,
            timer_fires: 0,
        }
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    /// True while at least one event is watching or one timer is armed.
    pub fn has_work(&self) -> bool {
        self.watching > 0 || self.armed > 0
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn next_timeout(&mut self) -> Option<Duration> {
        let timers = &self.timers;
        let deadline = self.queue.next_deadline(|id, seq| {
            timers.get(id.into()).map_or(false, |t| t.armed == Some(seq))
        })?;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    fn unregister(&mut self, id: EventId) {
        if let Some(slot) = self.events.get_mut(id.into()) {
            if let Some(token) = slot.reg.take() {
                // The descriptor may already be closed; nothing to report.
                let _ = self.poller.deregister(slot.sock, token);
                self.tokens.remove(&token);
                self.watching -= 1;
                self.deregistrations += 1;
            }
        }
    }

    /// One wait plus dispatch.
    fn run_pass(&mut self, timeout: Option<Duration>) -> Result<()> {
        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        match self.poller.wait(timeout, &mut ready) {
            Ok(()) => {}
            Err(ErrorCode::Interrupted) => ready.clear(),
            Err(code) => {
                self.ready = ready;
                return Err(IopsError::Io(code));
            }
        }
        self.dispatch_events(&ready);
        self.ready = ready;

        self.dispatch_timers(Instant::now());
        Ok(())
    }

    fn dispatch_events(&mut self, ready: &[Readiness]) {
        for r in ready {
            let Some(&id) = self.tokens.get(&r.token) else {
                continue;
            };
            let (sock, mask, cb) = match self.events.get(id.into()) {
                Some(slot) if slot.reg == Some(r.token) => {
                    let mut mask = r.mask & slot.mask;
                    if r.mask.contains(EventMask::ERROR) {
                        mask |= EventMask::ERROR | slot.mask;
                    }
                    match (&slot.callback, mask.is_empty()) {
                        (Some(cb), false) => (slot.sock, mask, cb.clone()),
                        _ => continue,
                    }
                }
                _ => continue,
            };
            self.event_dispatches += 1;
            cb(self, sock, mask);
        }
    }

    fn dispatch_timers(&mut self, now: Instant) {
        let mut expired = std::mem::take(&mut self.expired);
        expired.clear();
        {
            let timers = &self.timers;
            let is_armed =
                |id: TimerId, seq: u64| timers.get(id.into()).map_or(false, |t| t.armed == Some(seq));
            while let Some(entry) = self.queue.pop_expired(now, is_armed) {
                expired.push(entry);
            }
        }

        for &(id, seq) in &expired {
            let cb = match self.timers.get_mut(id.into()) {
                Some(slot) if slot.armed == Some(seq) => {
                    slot.armed = None;
                    self.armed -= 1;
                    match slot.callback.take() {
                        Some(cb) => cb,
                        None => continue,
                    }
                }
                _ => continue,
            };
            self.timer_fires += 1;
            cb(self, INVALID_SOCKET, EventMask::empty());
        }
        self.expired = expired;
    }
}

impl<P: Poller> LoopProcs for EventLoop<P> {
    fn start(&mut self) -> Result<()> {
        if !self.suspended {
            return Ok(());
        }
        self.suspended = false;

        let result = if self.stop_requested {
            self.run_pass(Some(Duration::ZERO))
        } else {
            loop {
                if !self.has_work() {
                    break Ok(());
                }
                let timeout = self.next_timeout();
                if let Err(err) = self.run_pass(timeout) {
                    break Err(err);
                }
                if self.stop_requested {
                    break Ok(());
                }
            }
        };

        self.stop_requested = false;
        self.suspended = true;
        result
    }

    fn stop(&mut self) {
        self.stop_requested = true;
    }

    fn tick(&mut self) -> Result<()> {
        if !self.suspended {
            return Ok(());
        }
        self.suspended = false;
        let result = self.run_pass(Some(Duration::ZERO));
        self.suspended = true;
        result
    }
}

impl<P: Poller> TimerProcs for EventLoop<P> {
    fn timer_create(&mut self) -> Result<TimerId> {
        Ok(self.timers.insert(TimerSlot::default()).into())
    }

    fn timer_schedule(&mut self, timer: TimerId, usecs: u32, callback: IoCallback) -> Result<()> {
        let slot = self.timers.get_mut(timer.into()).ok_or(IopsError::InvalidHandle)?;
        let deadline = Instant::now() + Duration::from_micros(u64::from(usecs));
        if slot.armed.is_none() {
            self.armed += 1;
        }
        slot.armed = Some(self.queue.push(timer, deadline));
        slot.callback = Some(callback);
        Ok(())
    }

    fn timer_cancel(&mut self, timer: TimerId) {
        if let Some(slot) = self.timers.get_mut(timer.into()) {
            if slot.armed.take().is_some() {
                self.armed -= 1;
            }
            slot.callback = None;
        }
    }

    fn timer_destroy(&mut self, timer: TimerId) {
        self.timer_cancel(timer);
        self.timers.remove(timer.into());
    }
}

impl<P: Poller> EventProcs for EventLoop<P> {
    fn event_create(&mut self) -> Result<EventId> {
        Ok(self.events.insert(EventSlot::detached()).into())
    }

    fn event_watch(
        &mut self,
        event: EventId,
        sock: Socket,
        mask: EventMask,
        callback: IoCallback,
    ) -> Result<()> {
        let mask = mask & EventMask::RW;
        let slot = self.events.get(event.into()).ok_or(IopsError::InvalidHandle)?;
        if slot.reg.is_some()
            && slot.sock == sock
            && slot.mask == mask
            && slot.callback.as_ref().map_or(false, |cb| same_callback(cb, &callback))
        {
            return Ok(());
        }

        self.unregister(event);
        let slot = self.events.get_mut(event.into()).ok_or(IopsError::InvalidHandle)?;
        slot.sock = sock;
        slot.mask = mask;
        if mask.is_empty() {
            slot.callback = None;
            return Ok(());
        }

        let token = self.next_token;
        self.next_token += 1;
        if let Err(code) = self.poller.register(sock, mask, token) {
            slot.callback = None;
            return Err(IopsError::Io(code));
        }
        slot.callback = Some(callback);
        slot.reg = Some(token);
        self.tokens.insert(token, event);
        self.watching += 1;
        self.registrations += 1;
        Ok(())
    }

    fn event_cancel(&mut self, event: EventId) {
        self.unregister(event);
        if let Some(slot) = self.events.get_mut(event.into()) {
            slot.callback = None;
        }
    }

    fn event_destroy(&mut self, event: EventId) {
        self.unregister(event);
        self.events.remove(event.into());
    }
}

impl<P: Poller> IoBackend for EventLoop<P> {
    fn name(&self) -> &'static str {
        self.poller.name()
    }

    fn procs_version(&self) -> u32 {
        PROCS_VERSION
    }

    fn bsd(&self) -> &dyn BsdProcs {
        &self.bsd
    }

    fn sockcheck(&self) -> Option<&dyn SockCheckProcs> {
        Some(&self.bsd)
    }

    fn sockcntl(&self) -> Option<&dyn SockCntlProcs> {
        Some(&self.bsd)
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            registrations: self.registrations,
            deregistrations: self.deregistrations,
            event_dispatches: self.event_dispatches,
            timer_fires: self.timer_fires,
            live_events: self.events.len(),
            live_timers: self.timers.len(),
        }
    }

    fn reactor_fd(&self) -> Option<Socket> {
        self.poller.reactor_fd()
    }

    fn owns_reactor(&self) -> bool {
        self.poller.owns_reactor()
    }
}

impl<P: Poller> Drop for EventLoop<P> {
    fn drop(&mut self) {
        ktrace!(
            "{} backend dropped with {} events, {} timers live",
            self.poller.name(),
            self.events.len(),
            self.timers.len()
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Poller that never reports readiness; only sleeps for timers.
    struct IdlePoller {
        registered: VecDeque<u64>,
    }

    impl Poller for IdlePoller {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn register(&mut self, _sock: Socket, _mask: EventMask, token: u64) -> IoResult<()> {
            self.registered.push_back(token);
            Ok(())
        }

        fn deregister(&mut self, _sock: Socket, token: u64) -> IoResult<()> {
            self.registered.retain(|t| *t != token);
            Ok(())
        }

        fn wait(&mut self, timeout: Option<Duration>, _ready: &mut Vec<Readiness>) -> IoResult<()> {
            if let Some(t) = timeout {
                std::thread::sleep(t);
            }
            Ok(())
        }
    }

    fn idle() -> EventLoop<IdlePoller> {
        EventLoop::new(IdlePoller { registered: VecDeque::new() })
    }

    #[test]
    fn timer_paths_without_os_poller() {
        conformance::timers_fire_in_order(&mut idle());
        conformance::zero_timer_stops_loop(&mut idle());
        conformance::sentinel_waits_for_all(&mut idle());
        conformance::stop_before_start(&mut idle());
        conformance::reentrant_calls_are_noops(&mut idle());
        conformance::stale_handles_rejected(&mut idle());
    }

    #[test]
    fn poller_sees_tokens_of_live_registrations() {
        let mut lp = idle();
        let ev = lp.event_create().unwrap();
        lp.event_watch(ev, 3, EventMask::READ, iops_core::callback(|_, _, _| {})).unwrap();
        assert_eq!(lp.poller().registered.len(), 1);
        let first = lp.poller().registered[0];

        // Same event on another socket gets a fresh token
        lp.event_watch(ev, 4, EventMask::READ, iops_core::callback(|_, _, _| {})).unwrap();
        assert_eq!(lp.poller().registered.len(), 1);
        assert_ne!(lp.poller().registered[0], first);

        lp.event_destroy(ev);
        assert!(lp.poller().registered.is_empty());
        assert!(lp.tokens.is_empty());
        assert_eq!(lp.stats().deregistrations, 2);
    }

    /// Poller that replays every readiness record it is fed.
    struct ScriptedPoller {
        pending: Vec<Readiness>,
    }

    impl Poller for ScriptedPoller {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn register(&mut self, _sock: Socket, _mask: EventMask, _token: u64) -> IoResult<()> {
            Ok(())
        }

        fn deregister(&mut self, _sock: Socket, _token: u64) -> IoResult<()> {
            Ok(())
        }

        fn wait(&mut self, _timeout: Option<Duration>, ready: &mut Vec<Readiness>) -> IoResult<()> {
            ready.append(&mut self.pending);
            Ok(())
        }
    }

    #[test]
    fn readiness_for_a_replaced_registration_is_dropped() {
        let mut lp = EventLoop::new(ScriptedPoller { pending: Vec::new() });
        let hits = std::rc::Rc::new(std::cell::Cell::new(0u32));
        let ev = lp.event_create().unwrap();
        let h = hits.clone();
        let cb = iops_core::callback(move |_, _, _| h.set(h.get() + 1));

        lp.event_watch(ev, 3, EventMask::READ, cb.clone()).unwrap();
        let old = *lp.tokens.keys().next().unwrap();
        lp.event_watch(ev, 4, EventMask::READ, cb).unwrap();
        let new = *lp.tokens.keys().next().unwrap();

        lp.poller.pending = vec![
            Readiness { token: old, mask: EventMask::READ },
            Readiness { token: u64::MAX, mask: EventMask::READ },
        ];
        lp.tick().unwrap();
        assert_eq!(hits.get(), 0);

        lp.poller.pending = vec![Readiness { token: new, mask: EventMask::READ }];
        lp.tick().unwrap();
        assert_eq!(hits.get(), 1);
        lp.event_destroy(ev);
    }

    #[test]
    fn timer_rearmed_at_zero_fires_next_pass() {
        let mut lp = idle();
        let t = lp.timer_create().unwrap();
        let fired = std::rc::Rc::new(std::cell::Cell::new(0u32));
        let f = fired.clone();
        let cb: std::rc::Rc<std::cell::RefCell<Option<IoCallback>>> = Default::default();
        let me = cb.clone();
        let rearm = iops_core::callback(move |r, _, _| {
            f.set(f.get() + 1);
            if let Some(again) = me.borrow().clone() {
                r.timer_schedule(t, 0, again).unwrap();
            }
        });
        *cb.borrow_mut() = Some(rearm.clone());
        lp.timer_schedule(t, 0, rearm).unwrap();

        lp.tick().unwrap();
        assert_eq!(fired.get(), 1);
        lp.tick().unwrap();
        assert_eq!(fired.get(), 2);

        cb.borrow_mut().take();
        lp.timer_destroy(t);
    }
}
