//! Error types.
//!
//! Two layers:
//! - [`ErrorCode`]: the portable socket-error space every platform code is
//!   normalized into. Socket operations return `IoResult<T>`.
//! - [`IopsError`]: everything else (backend resolution, version
//!   negotiation, handle misuse), wrapping an `ErrorCode` for I/O failures.

use std::fmt;

use thiserror::Error;

/// Portable socket error code.
///
/// Produced by the platform error normalizer immediately after a failing
/// socket call. Platform codes without a mapping collapse to
/// [`ErrorCode::InvalidArgument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConnReset,
    ConnAborted,
    WouldBlock,
    InProgress,
    AlreadyInProgress,
    IsConnected,
    NotConnected,
    ConnRefused,
    Interrupted,
    NetUnreachable,
    HostUnreachable,
    TimedOut,
    NotSocket,
    BadDescriptor,
    BrokenPipe,
    NotSupported,
    InvalidArgument,
    OutOfMemory,
}

impl ErrorCode {
    /// Would-block and interrupted: retry after re-registering interest.
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCode::WouldBlock | ErrorCode::Interrupted)
    }

    /// Codes a non-blocking `connect` reports while the handshake is still
    /// running.
    #[inline]
    pub fn is_connect_pending(self) -> bool {
        matches!(
            self,
            ErrorCode::InProgress | ErrorCode::AlreadyInProgress | ErrorCode::WouldBlock
        )
    }

    /// Conditions initiated by the remote side or the network.
    pub fn is_peer_condition(self) -> bool {
        matches!(
            self,
            ErrorCode::ConnReset
                | ErrorCode::ConnAborted
                | ErrorCode::ConnRefused
                | ErrorCode::NetUnreachable
                | ErrorCode::HostUnreachable
                | ErrorCode::BrokenPipe
                | ErrorCode::TimedOut
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ConnReset => "connection reset",
            ErrorCode::ConnAborted => "connection aborted",
            ErrorCode::WouldBlock => "operation would block",
            ErrorCode::InProgress => "operation in progress",
            ErrorCode::AlreadyInProgress => "operation already in progress",
            ErrorCode::IsConnected => "socket is connected",
            ErrorCode::NotConnected => "socket is not connected",
            ErrorCode::ConnRefused => "connection refused",
            ErrorCode::Interrupted => "interrupted",
            ErrorCode::NetUnreachable => "network unreachable",
            ErrorCode::HostUnreachable => "host unreachable",
            ErrorCode::TimedOut => "timed out",
            ErrorCode::NotSocket => "not a socket",
            ErrorCode::BadDescriptor => "bad descriptor",
            ErrorCode::BrokenPipe => "broken pipe",
            ErrorCode::NotSupported => "not supported",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::OutOfMemory => "out of memory",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

/// Result of a socket operation.
pub type IoResult<T> = std::result::Result<T, ErrorCode>;

/// Errors from backend construction and handle management.
#[derive(Debug, Error)]
pub enum IopsError {
    /// A socket or reactor call failed.
    #[error("I/O error: {0}")]
    Io(#[from] ErrorCode),

    /// Allocation of backend state failed.
    #[error("out of memory while constructing backend")]
    OutOfMemory,

    /// The requested or declared procedure-table version is unusable.
    #[error("plugin version mismatch: requested {requested}, supported {supported}")]
    PluginVersionMismatch { requested: u32, supported: u32 },

    /// The plugin's entry symbol could not be resolved.
    #[error("symbol `{symbol}` not found: {reason}")]
    SymbolLookupFailed { symbol: String, reason: String },

    /// The plugin library could not be opened.
    #[error("failed to open `{library}`: {reason}")]
    DlopenFailed { library: String, reason: String },

    /// No builtin backend has this name and no plugin symbol was given.
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    /// Configuration taken from the environment is inconsistent.
    #[error("bad environment: {0}")]
    BadEnvironment(String),

    /// The backend cannot honour the request (e.g. external reactor).
    #[error("not supported by backend `{backend}`: {what}")]
    NotSupported {
        backend: &'static str,
        what: &'static str,
    },

    /// Event or timer ID is stale or never existed.
    #[error("invalid or destroyed handle")]
    InvalidHandle,
}

/// Numeric statuses reported by [`IopsError::status`] and returned by
/// plugin constructors.
pub const STATUS_INVALID_HANDLE: u32 = 0x07;
pub const STATUS_DLOPEN_FAILED: u32 = 0x0E;
pub const STATUS_SYMBOL_LOOKUP_FAILED: u32 = 0x0F;
pub const STATUS_NOT_SUPPORTED: u32 = 0x13;
pub const STATUS_IO: u32 = 0x17;
pub const STATUS_OUT_OF_MEMORY: u32 = 0x1A;
pub const STATUS_VERSION_MISMATCH: u32 = 0x1E;
pub const STATUS_BAD_ENVIRONMENT: u32 = 0x24;

impl IopsError {
    /// Stable numeric status, matching the client library's status space
    /// for the plugin-resolution conditions.
    pub fn status(&self) -> u32 {
        match self {
            IopsError::Io(_) => STATUS_IO,
            IopsError::OutOfMemory => STATUS_OUT_OF_MEMORY,
            IopsError::PluginVersionMismatch { .. } => STATUS_VERSION_MISMATCH,
            IopsError::SymbolLookupFailed { .. } => STATUS_SYMBOL_LOOKUP_FAILED,
            IopsError::DlopenFailed { .. } => STATUS_DLOPEN_FAILED,
            IopsError::UnknownBackend(_) | IopsError::NotSupported { .. } => STATUS_NOT_SUPPORTED,
            IopsError::BadEnvironment(_) => STATUS_BAD_ENVIRONMENT,
            IopsError::InvalidHandle => STATUS_INVALID_HANDLE,
        }
    }

    /// The wrapped socket code, if this is an I/O failure.
    pub fn io_code(&self) -> Option<ErrorCode> {
        match self {
            IopsError::Io(code) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IopsError>;
