//! # iops
//!
//! One versioned procedure table over interchangeable I/O backends.
//!
//! ```text
//! BackendConfig ──► acquire_backend ──► builtin (epoll / uring / select)
//!                                   └─► plugin  (dlopen + constructor)
//!                         │
//!                         ▼
//!                  ProcedureTable (negotiated version)
//!                   ├── loop_procs / timer_procs / event_procs
//!                   ├── bsd
//!                   └── sockcheck (v3+) / sockcntl (v4+)
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use iops::{acquire_backend, callback, BackendConfig, LoopProcs, TimerProcs};
//!
//! let mut table = acquire_backend(&BackendConfig::new(), None).unwrap();
//! let t = table.timer_create().unwrap();
//! table
//!     .timer_schedule(t, 1000, callback(|r, _, _| r.stop()))
//!     .unwrap();
//! table.start().unwrap();
//! table.timer_destroy(t);
//! table.destroy();
//! ```
//!
//! ## Environment
//!
//! Read only by [`BackendConfig::from_env`] / [`acquire_default`]:
//!
//! - `IOPS_BACKEND` (alias `IOPS_EVENT_PLUGIN_NAME`): backend name
//! - `IOPS_BACKEND_SYMBOL`: plugin constructor symbol
//! - `IOPS_BACKEND_LIBRARY`: plugin library path
//! - `IOPS_DLOPEN_DEBUG`: print resolution diagnostics
//! - `IOPS_LOG_LEVEL`: log verbosity (`error`..`trace`)

pub mod config;
pub mod plugin;
pub mod registry;
pub mod table;

#[cfg(test)]
mod testing;

pub use config::BackendConfig;
pub use registry::{acquire_backend, acquire_default, default_backend_name, ExternalReactor};
pub use table::ProcedureTable;

pub use iops_core::{
    callback, declare_backend, BsdProcs, ConnectStatus, ErrorCode, EventId, EventMask,
    EventProcs, IoBackend, IoCallback, IoResult, IopsError, LoopProcs, Reactor, Result,
    SockCheckFlags, SockCheckProcs, SockCntlProcs, SockOption, SockStatus, Socket, TimerId,
    TimerProcs, PROCS_VERSION,
};
