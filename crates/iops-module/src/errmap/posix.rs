//! errno table.

use iops_core::ErrorCode;

/// Map a raw `errno` to the portable code.
pub fn normalize(errno: i32) -> ErrorCode {
    match errno {
        libc::ECONNRESET => ErrorCode::ConnReset,
        libc::ECONNABORTED => ErrorCode::ConnAborted,
        libc::EAGAIN => ErrorCode::WouldBlock,
        // Distinct from EAGAIN on a few targets
        e if e == libc::EWOULDBLOCK => ErrorCode::WouldBlock,
        libc::EINPROGRESS => ErrorCode::InProgress,
        libc::EALREADY => ErrorCode::AlreadyInProgress,
        libc::EISCONN => ErrorCode::IsConnected,
        libc::ENOTCONN => ErrorCode::NotConnected,
        libc::ECONNREFUSED => ErrorCode::ConnRefused,
        libc::EINTR => ErrorCode::Interrupted,
        libc::ENETUNREACH | libc::ENETDOWN => ErrorCode::NetUnreachable,
        libc::EHOSTUNREACH => ErrorCode::HostUnreachable,
        libc::ETIMEDOUT => ErrorCode::TimedOut,
        libc::ENOTSOCK => ErrorCode::NotSocket,
        libc::EBADF => ErrorCode::BadDescriptor,
        libc::EPIPE => ErrorCode::BrokenPipe,
        libc::EOPNOTSUPP | libc::ENOPROTOOPT | libc::EPROTONOSUPPORT | libc::EAFNOSUPPORT => {
            ErrorCode::NotSupported
        }
        libc::ENOMEM | libc::ENOBUFS => ErrorCode::OutOfMemory,
        _ => ErrorCode::InvalidArgument,
    }
}
