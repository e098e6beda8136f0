//! Plugin entry ABI.
//!
//! A plugin exports one `extern "C"` constructor. The loader calls it with
//! the procedure version the client asked for and receives an opaque
//! pointer to a `Box<Box<dyn IoBackend>>`.
//!
//! Trait objects have no stable layout, so a plugin must be built with the
//! same compiler and the same `iops-core` as the host.
//!
//! ```ignore
//! iops_core::declare_backend!(iops_create_mine_backend, |version| {
//!     MyBackend::new(version)
//! });
//! ```

use std::ffi::c_void;

use crate::error::Result;
use crate::procs::IoBackend;

/// Constructor signature exported by plugins.
pub type PluginEntry = unsafe extern "C" fn(version: u32, out: *mut *mut c_void) -> i32;

/// Entry returned a backend in `*out`.
pub const PLUGIN_OK: i32 = 0;

/// Entry ran but the constructor failed; the value is the error's status.
pub const PLUGIN_FAILED: i32 = -1;

/// Move a constructed backend into an out-pointer. Used by
/// [`declare_backend!`]; returns `PLUGIN_OK` or the error status.
///
/// # Safety
///
/// `out` must be valid for one pointer write.
#[doc(hidden)]
pub unsafe fn export_backend(
    out: *mut *mut c_void,
    built: Result<Box<dyn IoBackend>>,
) -> i32 {
    if out.is_null() {
        return PLUGIN_FAILED;
    }
    match built {
        Ok(backend) => {
            let outer: Box<Box<dyn IoBackend>> = Box::new(backend);
            *out = Box::into_raw(outer) as *mut c_void;
            PLUGIN_OK
        }
        Err(err) => err.status() as i32,
    }
}

/// Reclaim a backend produced by [`export_backend`].
///
/// # Safety
///
/// `raw` must come from a successful plugin entry call and not have been
/// reclaimed before.
pub unsafe fn import_backend(raw: *mut c_void) -> Box<dyn IoBackend> {
    let outer: Box<Box<dyn IoBackend>> = Box::from_raw(raw as *mut Box<dyn IoBackend>);
    *outer
}

/// Export a plugin constructor under `$symbol`.
///
/// `$ctor` is called with the requested procedure version and returns
/// `Result<impl IoBackend + 'static>`.
#[macro_export]
macro_rules! declare_backend {
    ($symbol:ident, $ctor:expr) => {
        #[no_mangle]
        pub unsafe extern "C" fn $symbol(
            version: u32,
            out: *mut *mut ::std::ffi::c_void,
        ) -> i32 {
            let built = ($ctor)(version).map(|b| {
                ::std::boxed::Box::new(b) as ::std::boxed::Box<dyn $crate::procs::IoBackend>
            });
            $crate::plugin::export_backend(out, built)
        }
    };
}
