//! `ProcedureTable`, the versioned surface the client calls through.
//!
//! Loop, timer and event calls delegate straight to the backend. The two
//! optional socket members are only handed out when the negotiated
//! version covers them, so a client that asked for an older table cannot
//! reach them.

use iops_core::{
    kdebug, version, BackendStats, BsdProcs, EventId, EventMask, EventProcs, IoBackend,
    IoCallback, LoopProcs, Result, SockCheckProcs, SockCntlProcs, Socket, TimerId, TimerProcs,
    PROCS_VERSION_CNTL, PROCS_VERSION_SOCKCHECK,
};

use crate::plugin::Library;

pub struct ProcedureTable {
    // Field order is drop order: the backend's code may live in `library`
    backend: Box<dyn IoBackend>,
    version: u32,
    library: Option<Library>,
}

impl ProcedureTable {
    /// Wrap `backend`, negotiating `requested` against its declared version.
    pub fn new(
        backend: Box<dyn IoBackend>,
        requested: u32,
        library: Option<Library>,
    ) -> Result<Self> {
        let version = version::negotiate(requested, backend.procs_version())?;
        kdebug!(
            "procedure table for {}: requested v{}, declared v{}, using v{}",
            backend.name(),
            requested,
            backend.procs_version(),
            version
        );
        Ok(Self { backend, version, library })
    }

    /// Negotiated version
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_plugin(&self) -> bool {
        self.library.is_some()
    }

    pub fn loop_procs(&mut self) -> &mut dyn LoopProcs {
        self
    }

    pub fn timer_procs(&mut self) -> &mut dyn TimerProcs {
        self
    }

    pub fn event_procs(&mut self) -> &mut dyn EventProcs {
        self
    }

    pub fn bsd(&self) -> &dyn BsdProcs {
        self.backend.bsd()
    }

    /// Closed-socket probe, if negotiated.
    pub fn sockcheck(&self) -> Option<&dyn SockCheckProcs> {
        if self.version >= PROCS_VERSION_SOCKCHECK {
            self.backend.sockcheck()
        } else {
            None
        }
    }

    /// Socket option control, if negotiated.
    pub fn sockcntl(&self) -> Option<&dyn SockCntlProcs> {
        if self.version >= PROCS_VERSION_CNTL {
            self.backend.sockcntl()
        } else {
            None
        }
    }

    pub fn stats(&self) -> BackendStats {
        self.backend.stats()
    }

    pub fn reactor_fd(&self) -> Option<Socket> {
        self.backend.reactor_fd()
    }

    pub fn owns_reactor(&self) -> bool {
        self.backend.owns_reactor()
    }

    /// Tear down the backend, then release the plugin library.
    ///
    /// Every event and timer must have been destroyed first.
    pub fn destroy(self) {}
}

impl LoopProcs for ProcedureTable {
    fn start(&mut self) -> Result<()> {
        self.backend.start()
    }

    fn stop(&mut self) {
        self.backend.stop()
    }

    fn tick(&mut self) -> Result<()> {
        self.backend.tick()
    }
}

impl TimerProcs for ProcedureTable {
    fn timer_create(&mut self) -> Result<TimerId> {
        self.backend.timer_create()
    }

    fn timer_schedule(&mut self, timer: TimerId, usecs: u32, callback: IoCallback) -> Result<()> {
        self.backend.timer_schedule(timer, usecs, callback)
    }

    fn timer_cancel(&mut self, timer: TimerId) {
        self.backend.timer_cancel(timer)
    }

    fn timer_destroy(&mut self, timer: TimerId) {
        self.backend.timer_destroy(timer)
    }
}

impl EventProcs for ProcedureTable {
    fn event_create(&mut self) -> Result<EventId> {
        self.backend.event_create()
    }

    fn event_watch(
        &mut self,
        event: EventId,
        sock: Socket,
        mask: EventMask,
        callback: IoCallback,
    ) -> Result<()> {
        self.backend.event_watch(event, sock, mask, callback)
    }

    fn event_cancel(&mut self, event: EventId) {
        self.backend.event_cancel(event)
    }

    fn event_destroy(&mut self, event: EventId) {
        self.backend.event_destroy(event)
    }
}

impl Drop for ProcedureTable {
    fn drop(&mut self) {
        kdebug!("destroying {} procedure table", self.backend.name());
    }
}

impl std::fmt::Debug for ProcedureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureTable")
            .field("backend", &self.backend.name())
            .field("version", &self.version)
            .field("library", &self.library)
            .finish()
    }
}
