//! Procedure-table versions.
//!
//! Versions only ever add members. A table negotiated at version `V`
//! exposes every member introduced at or below `V`.

use crate::error::{IopsError, Result};

/// Oldest version a client may request.
pub const PROCS_VERSION_MIN: u32 = 1;

/// First version carrying closed-socket probing.
pub const PROCS_VERSION_SOCKCHECK: u32 = 3;

/// First version carrying socket option control.
pub const PROCS_VERSION_CNTL: u32 = 4;

/// Current (latest) version.
pub const PROCS_VERSION: u32 = 4;

/// Check that a backend-declared version is one this library understands.
pub fn check_declared(declared: u32) -> Result<()> {
    if (PROCS_VERSION_MIN..=PROCS_VERSION).contains(&declared) {
        Ok(())
    } else {
        Err(IopsError::PluginVersionMismatch {
            requested: declared,
            supported: PROCS_VERSION,
        })
    }
}

/// Effective version for a client request against a backend.
///
/// Requests outside `PROCS_VERSION_MIN..=PROCS_VERSION` fail. Otherwise the
/// result is the lower of the request and what the backend declares.
pub fn negotiate(requested: u32, declared: u32) -> Result<u32> {
    if !(PROCS_VERSION_MIN..=PROCS_VERSION).contains(&requested) {
        return Err(IopsError::PluginVersionMismatch {
            requested,
            supported: PROCS_VERSION,
        });
    }
    check_declared(declared)?;
    Ok(requested.min(declared))
}
