//! Winsock table.
//!
//! Plain integer codes so the table builds and tests on every target.

use iops_core::ErrorCode;

pub const WSA_NOT_ENOUGH_MEMORY: i32 = 8;
pub const WSAEINTR: i32 = 10004;
pub const WSAEBADF: i32 = 10009;
pub const WSAEINVAL: i32 = 10022;
pub const WSAEWOULDBLOCK: i32 = 10035;
pub const WSAEINPROGRESS: i32 = 10036;
pub const WSAEALREADY: i32 = 10037;
pub const WSAENOTSOCK: i32 = 10038;
pub const WSAEOPNOTSUPP: i32 = 10045;
pub const WSAENETDOWN: i32 = 10050;
pub const WSAENETUNREACH: i32 = 10051;
pub const WSAECONNABORTED: i32 = 10053;
pub const WSAECONNRESET: i32 = 10054;
pub const WSAENOBUFS: i32 = 10055;
pub const WSAEISCONN: i32 = 10056;
pub const WSAENOTCONN: i32 = 10057;
pub const WSAETIMEDOUT: i32 = 10060;
pub const WSAECONNREFUSED: i32 = 10061;
pub const WSAEHOSTUNREACH: i32 = 10065;

/// Map a `WSAGetLastError()` value to the portable code.
pub fn normalize(code: i32) -> ErrorCode {
    match code {
        WSAECONNRESET => ErrorCode::ConnReset,
        WSAECONNABORTED => ErrorCode::ConnAborted,
        WSAEWOULDBLOCK => ErrorCode::WouldBlock,
        WSAEINPROGRESS => ErrorCode::InProgress,
        WSAEALREADY => ErrorCode::AlreadyInProgress,
        WSAEISCONN => ErrorCode::IsConnected,
        WSAENOTCONN => ErrorCode::NotConnected,
        WSAECONNREFUSED => ErrorCode::ConnRefused,
        WSAEINTR => ErrorCode::Interrupted,
        WSAENETUNREACH | WSAENETDOWN => ErrorCode::NetUnreachable,
        WSAEHOSTUNREACH => ErrorCode::HostUnreachable,
        WSAETIMEDOUT => ErrorCode::TimedOut,
        WSAENOTSOCK => ErrorCode::NotSocket,
        WSAEBADF => ErrorCode::BadDescriptor,
        WSAEOPNOTSUPP => ErrorCode::NotSupported,
        WSA_NOT_ENOUGH_MEMORY | WSAENOBUFS => ErrorCode::OutOfMemory,
        _ => ErrorCode::InvalidArgument,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(normalize(WSAEWOULDBLOCK), ErrorCode::WouldBlock);
        assert_eq!(normalize(WSAEINPROGRESS), ErrorCode::InProgress);
        assert_eq!(normalize(WSAECONNRESET), ErrorCode::ConnReset);
        assert_eq!(normalize(WSAENOTSOCK), ErrorCode::NotSocket);
        assert_eq!(normalize(WSA_NOT_ENOUGH_MEMORY), ErrorCode::OutOfMemory);
    }

    #[test]
    fn unmapped_falls_back() {
        assert_eq!(normalize(WSAEINVAL), ErrorCode::InvalidArgument);
        assert_eq!(normalize(0), ErrorCode::InvalidArgument);
        assert_eq!(normalize(12345), ErrorCode::InvalidArgument);
    }
}
