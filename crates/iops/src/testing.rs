//! Test-only backend declaring an older procedure version.

use iops_core::{
    BackendStats, BsdProcs, EventId, EventMask, EventProcs, IoBackend, IoCallback, LoopProcs,
    Result, Socket, TimerId, TimerProcs,
};
use iops_module::select::{self, SelectBackend};

/// A select backend that only populates members up to `declared`.
pub struct Legacy {
    inner: SelectBackend,
    declared: u32,
}

impl Legacy {
    pub fn new(declared: u32) -> Self {
        Self {
            inner: select::backend(),
            declared,
        }
    }
}

impl LoopProcs for Legacy {
    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&mut self) {
        self.inner.stop()
    }

    fn tick(&mut self) -> Result<()> {
        self.inner.tick()
    }
}

impl TimerProcs for Legacy {
    fn timer_create(&mut self) -> Result<TimerId> {
        self.inner.timer_create()
    }

    fn timer_schedule(&mut self, timer: TimerId, usecs: u32, callback: IoCallback) -> Result<()> {
        self.inner.timer_schedule(timer, usecs, callback)
    }

    fn timer_cancel(&mut self, timer: TimerId) {
        self.inner.timer_cancel(timer)
    }

    fn timer_destroy(&mut self, timer: TimerId) {
        self.inner.timer_destroy(timer)
    }
}

impl EventProcs for Legacy {
    fn event_create(&mut self) -> Result<EventId> {
        self.inner.event_create()
    }

    fn event_watch(
        &mut self,
        event: EventId,
        sock: Socket,
        mask: EventMask,
        callback: IoCallback,
    ) -> Result<()> {
        self.inner.event_watch(event, sock, mask, callback)
    }

    fn event_cancel(&mut self, event: EventId) {
        self.inner.event_cancel(event)
    }

    fn event_destroy(&mut self, event: EventId) {
        self.inner.event_destroy(event)
    }
}

impl IoBackend for Legacy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn procs_version(&self) -> u32 {
        self.declared
    }

    fn bsd(&self) -> &dyn BsdProcs {
        self.inner.bsd()
    }

    fn stats(&self) -> BackendStats {
        self.inner.stats()
    }
}
