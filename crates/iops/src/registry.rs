//! Builtin backend registry and `acquire_backend`.

use iops_core::{kdebug_if, IoBackend, IopsError, Result, Socket};

use crate::config::BackendConfig;
use crate::plugin;
use crate::table::ProcedureTable;

/// Builtin backends compiled into this build, preferred first.
pub const BUILTIN_BACKENDS: &[&str] = &[
    #[cfg(target_os = "linux")]
    "epoll",
    #[cfg(all(target_os = "linux", feature = "uring"))]
    "uring",
    #[cfg(unix)]
    "select",
];

/// Backend used when the configuration names none.
pub fn default_backend_name() -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            "epoll"
        } else {
            "select"
        }
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_BACKENDS.contains(&name)
}

/// A reactor handle owned by the caller.
///
/// Only the epoll backend can adopt one (an epoll descriptor). The
/// backend never closes it; the caller must keep it open until the
/// procedure table is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalReactor {
    fd: Socket,
}

impl ExternalReactor {
    pub fn new(fd: Socket) -> Self {
        Self { fd }
    }

    pub fn fd(&self) -> Socket {
        self.fd
    }
}

fn external_unsupported(backend: &'static str) -> IopsError {
    IopsError::NotSupported {
        backend,
        what: "external reactor handle",
    }
}

/// Construct a builtin backend by name.
pub fn create_builtin(name: &str, external: Option<ExternalReactor>) -> Result<Box<dyn IoBackend>> {
    match name {
        #[cfg(target_os = "linux")]
        "epoll" => match external {
            Some(reactor) => Ok(Box::new(iops_module::epoll::with_reactor(reactor.fd()))),
            None => Ok(Box::new(iops_module::epoll::backend()?)),
        },
        #[cfg(all(target_os = "linux", feature = "uring"))]
        "uring" => match external {
            Some(_) => Err(external_unsupported("uring")),
            None => Ok(Box::new(iops_module::uring::backend()?)),
        },
        #[cfg(unix)]
        "select" => match external {
            Some(_) => Err(external_unsupported("select")),
            None => Ok(Box::new(iops_module::select::backend())),
        },
        other => Err(IopsError::UnknownBackend(other.to_string())),
    }
}

/// Resolve `config` to a backend and wrap it in a procedure table.
///
/// Builtin names resolve directly unless a symbol or library override is
/// present; everything else goes through the plugin loader. Failure is
/// reported as-is, never replaced by another backend.
///
/// `config.debug` prints resolution diagnostics for this call only; the
/// process log level is not touched.
pub fn acquire_backend(
    config: &BackendConfig,
    external: Option<ExternalReactor>,
) -> Result<ProcedureTable> {
    config.validate()?;

    let name = config.resolved_name();
    if !config.is_plugin() {
        kdebug_if!(config.debug, "using builtin backend {}", name);
        let backend = create_builtin(name, external)?;
        return ProcedureTable::new(backend, config.version, None);
    }

    if external.is_some() {
        return Err(external_unsupported("plugin"));
    }
    kdebug_if!(config.debug, "resolving plugin backend {}", name);
    let (library, backend) = plugin::load(config)?;
    ProcedureTable::new(backend, config.version, Some(library))
}

/// Acquire the backend named by the process environment.
pub fn acquire_default() -> Result<ProcedureTable> {
    let config = BackendConfig::from_env()?;
    acquire_backend(&config, None)
}
