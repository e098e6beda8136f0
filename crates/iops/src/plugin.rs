//! Dynamic plugin loading.
//!
//! Resolution order for a plugin backend:
//!
//! 1. `config.library` (or `libiops_<name>.so`) via `libloading`, then the
//!    constructor symbol in it.
//! 2. The constructor symbol in the running image.
//!
//! The [`Library`] handle must outlive the backend it produced.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use iops_core::error::{STATUS_OUT_OF_MEMORY, STATUS_VERSION_MISMATCH};
use iops_core::plugin::{import_backend, PluginEntry, PLUGIN_OK};
use iops_core::{kdebug_if, kwarn, version, IoBackend, IopsError, Result};

use crate::config::BackendConfig;

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        const DLL_EXT: &str = "dylib";
    } else {
        const DLL_EXT: &str = "so";
    }
}

/// Default library file for a plugin name.
pub fn library_name(backend: &str) -> PathBuf {
    PathBuf::from(format!("libiops_{backend}.{DLL_EXT}"))
}

/// Default constructor symbol for a plugin name.
pub fn symbol_name(backend: &str) -> String {
    format!("iops_create_{backend}_backend")
}

/// A loaded shared object (or the running image). Unloaded on drop.
pub struct Library {
    library: libloading::Library,
    label: String,
}

impl Library {
    /// Open a shared object.
    pub fn open(path: &Path) -> Result<Self> {
        let label = path.display().to_string();
        // SAFETY: loading runs the library's initialisers; plugin paths
        // come from the caller's configuration
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            IopsError::DlopenFailed {
                library: label.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { library, label })
    }

    /// Handle on the running image.
    pub fn this_image() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                let library: libloading::Library = libloading::os::unix::Library::this().into();
            } else {
                let library: libloading::Library = libloading::os::windows::Library::this()
                    .map_err(|e| IopsError::DlopenFailed {
                        library: "<self>".to_string(),
                        reason: e.to_string(),
                    })?
                    .into();
            }
        }
        Ok(Self { library, label: "<self>".to_string() })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.is_ok()
    }

    /// Resolve a plugin constructor.
    pub fn entry(&self, name: &str) -> Result<PluginEntry> {
        // SAFETY: plugins export this symbol with the PluginEntry signature
        let sym = unsafe { self.library.get::<PluginEntry>(name.as_bytes()) }.map_err(|e| {
            IopsError::SymbolLookupFailed {
                symbol: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(*sym)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("label", &self.label).finish()
    }
}

/// Run a constructor and take ownership of the backend it returns.
pub fn construct(entry: PluginEntry, symbol: &str, version: u32) -> Result<Box<dyn IoBackend>> {
    let mut out: *mut c_void = std::ptr::null_mut();
    let rc = unsafe { entry(version, &mut out) };
    if rc != PLUGIN_OK || out.is_null() {
        return Err(match rc as u32 {
            STATUS_VERSION_MISMATCH => IopsError::PluginVersionMismatch {
                requested: version,
                supported: version::PROCS_VERSION,
            },
            STATUS_OUT_OF_MEMORY => IopsError::OutOfMemory,
            _ => IopsError::SymbolLookupFailed {
                symbol: symbol.to_string(),
                reason: format!("constructor returned status {rc}"),
            },
        });
    }
    let backend = unsafe { import_backend(out) };
    version::check_declared(backend.procs_version())?;
    Ok(backend)
}

/// Resolve, open and construct the plugin named by `config`.
pub fn load(config: &BackendConfig) -> Result<(Library, Box<dyn IoBackend>)> {
    let name = config.resolved_name();
    let symbol = config.symbol.clone().unwrap_or_else(|| symbol_name(name));
    let path = config.library.clone().unwrap_or_else(|| library_name(name));

    let open_err = match Library::open(&path) {
        Ok(lib) => match lib.entry(&symbol) {
            Ok(entry) => {
                kdebug_if!(config.debug, "found {} in {}", symbol, lib.label());
                let backend = construct(entry, &symbol, config.version)?;
                return Ok((lib, backend));
            }
            Err(err) => {
                if config.debug {
                    kwarn!("{}", err);
                }
                None
            }
        },
        Err(err) => {
            if config.debug {
                kwarn!("{}", err);
            }
            Some(err)
        }
    };

    let this = Library::this_image()?;
    match this.entry(&symbol) {
        Ok(entry) => {
            kdebug_if!(config.debug, "found {} in running image", symbol);
            let backend = construct(entry, &symbol, config.version)?;
            Ok((this, backend))
        }
        Err(lookup_err) => {
            if config.debug {
                kwarn!("{}", lookup_err);
            }
            // An explicitly named library that failed to open is the
            // more useful report
            match open_err {
                Some(err) if config.library.is_some() => Err(err),
                _ => Err(lookup_err),
            }
        }
    }
}
