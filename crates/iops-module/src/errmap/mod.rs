//! Error Normalizer.
//!
//! Converts the platform's socket error code into the portable
//! [`ErrorCode`] space. Each platform has one table; both converge on the
//! same enumeration. Codes without an entry become
//! [`ErrorCode::InvalidArgument`].
//!
//! Call [`normalize_last`] directly after the failing call. Anything in
//! between (even logging) may overwrite the thread's last error.

use iops_core::ErrorCode;

#[cfg(unix)]
pub mod posix;
pub mod winsock;

/// Normalize the calling thread's last socket error.
#[inline]
pub fn normalize_last() -> ErrorCode {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            posix::normalize(nix::errno::Errno::last_raw())
        } else if #[cfg(windows)] {
            winsock::normalize(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
        }
    }
}

/// Normalize a raw platform code for the current target.
#[inline]
pub fn normalize(code: i32) -> ErrorCode {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            posix::normalize(code)
        } else {
            winsock::normalize(code)
        }
    }
}

/// Normalize a `std::io::Error` coming from a std socket call.
pub fn from_io_error(err: &std::io::Error) -> ErrorCode {
    match err.raw_os_error() {
        Some(code) => normalize(code),
        None => match err.kind() {
            std::io::ErrorKind::WouldBlock => ErrorCode::WouldBlock,
            std::io::ErrorKind::Interrupted => ErrorCode::Interrupted,
            std::io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
            _ => ErrorCode::InvalidArgument,
        },
    }
}
