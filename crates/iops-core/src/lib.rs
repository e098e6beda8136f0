//! # iops-core
//!
//! Core types and traits for the pluggable I/O backend layer.
//!
//! A backend is anything that implements [`procs::IoBackend`]: loop
//! control, timers, socket readiness events, and non-blocking BSD socket
//! calls. The client only ever sees these traits; concrete backends live
//! in `iops-module` and plugins.
//!
//! This crate contains no reactor code.
//!
//! ## Modules
//!
//! - `error` - Portable socket error codes and the backend error type
//! - `socket` - Socket handle, readiness mask, connect/probe outcomes
//! - `handle` - Event/timer IDs and the generational arena behind them
//! - `procs` - Procedure traits and the callback type
//! - `version` - Procedure-table versions and negotiation
//! - `plugin` - Plugin constructor ABI and `declare_backend!`
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod error;
pub mod socket;
pub mod handle;
pub mod procs;
pub mod version;
pub mod plugin;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use error::{ErrorCode, IoResult, IopsError, Result};
pub use socket::{
    ConnectStatus, EventMask, SockCheckFlags, SockOption, SockStatus, Socket, INVALID_SOCKET,
};
pub use handle::{Arena, EventId, SlotId, TimerId};
pub use procs::{
    callback, same_callback, BackendStats, BsdProcs, EventProcs, IoBackend, IoCallback,
    LoopProcs, Reactor, SockCheckProcs, SockCntlProcs, TimerProcs,
};
pub use version::{
    PROCS_VERSION, PROCS_VERSION_CNTL, PROCS_VERSION_MIN, PROCS_VERSION_SOCKCHECK,
};
pub use env::{env_get, env_get_bool, env_get_first, env_get_opt};
