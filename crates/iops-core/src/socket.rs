//! Socket-level types shared by every backend.

use bitflags::bitflags;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// OS socket descriptor.
        pub type Socket = std::os::unix::io::RawFd;

        /// Sentinel passed to timer callbacks and used for "no socket".
        pub const INVALID_SOCKET: Socket = -1;
    } else if #[cfg(windows)] {
        /// OS socket handle.
        pub type Socket = usize;

        /// Sentinel passed to timer callbacks and used for "no socket".
        pub const INVALID_SOCKET: Socket = !0;
    } else {
        compile_error!("Unsupported platform");
    }
}

bitflags! {
    /// Backend-independent readiness bits.
    ///
    /// Backends translate their native flags (`POLLIN`, `EPOLLOUT`, fd_set
    /// membership, ...) into these before invoking a callback.
    pub struct EventMask: u16 {
        const READ = 0x02;
        const WRITE = 0x04;
        const ERROR = 0x08;
        const RW = Self::READ.bits | Self::WRITE.bits;
    }
}

impl Default for EventMask {
    fn default() -> Self {
        EventMask::empty()
    }
}

/// Outcome of a non-blocking `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The handshake completed (or was already complete).
    Connected,
    /// The handshake is running; wait for writability and call again.
    Pending,
}

/// Result of probing an idle socket for remote closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockStatus {
    Ok,
    Closed,
    Unknown,
}

bitflags! {
    /// Flags for [`crate::procs::SockCheckProcs::is_closed`].
    pub struct SockCheckFlags: u32 {
        /// Unsolicited pending data counts as a closed (unusable) socket.
        const PEND_IS_ERROR = 0x01;
    }
}

/// Options reachable through the socket control member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOption {
    NoDelay,
    KeepAlive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bits_match_wire_values() {
        assert_eq!(EventMask::READ.bits(), 0x02);
        assert_eq!(EventMask::WRITE.bits(), 0x04);
        assert_eq!(EventMask::ERROR.bits(), 0x08);
        assert_eq!(EventMask::RW, EventMask::READ | EventMask::WRITE);
        assert!(EventMask::default().is_empty());
    }
}
