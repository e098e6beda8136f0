//! # iops-module: default backend implementations
//!
//! Every builtin backend is an [`event_loop::EventLoop`] over one readiness
//! source. The event/timer/loop semantics live in the shared core; a
//! poller only translates interest and readiness.
//!
//! ## Default stack
//!
//! | Concern           | Default Impl   | Alternatives                  |
//! |-------------------|----------------|-------------------------------|
//! | Readiness         | EpollPoller    | SelectPoller, UringPoller     |
//! | Timers            | TimerQueue     |                               |
//! | Socket calls      | BsdIo          |                               |
//! | Error mapping     | errmap::posix  | errmap::winsock (table only)  |

pub mod errmap;

#[cfg(unix)]
pub mod bsdio;
#[cfg(unix)]
pub mod event_loop;
#[cfg(unix)]
pub mod select;
#[cfg(target_os = "linux")]
pub mod epoll;
#[cfg(all(target_os = "linux", feature = "uring"))]
pub mod uring;

pub mod timer_queue;

#[cfg(unix)]
pub use bsdio::BsdIo;
#[cfg(unix)]
pub use event_loop::{EventLoop, Poller, Readiness};
#[cfg(unix)]
pub use select::{SelectBackend, SelectPoller};
#[cfg(target_os = "linux")]
pub use epoll::{EpollBackend, EpollPoller};
#[cfg(all(target_os = "linux", feature = "uring"))]
pub use uring::{UringBackend, UringPoller};
pub use timer_queue::TimerQueue;
