//! Backend selection configuration

use std::path::PathBuf;

use iops_core::env::{env_get_bool_any, env_get_first, env_get_opt};
use iops_core::{IopsError, Result, PROCS_VERSION, PROCS_VERSION_MIN};

use crate::registry;

/// Backend name (`select`, `epoll`, `uring`, or a plugin name)
pub const ENV_BACKEND: &str = "IOPS_BACKEND";
/// Alias of [`ENV_BACKEND`]
pub const ENV_BACKEND_ALIAS: &str = "IOPS_EVENT_PLUGIN_NAME";
/// Plugin constructor symbol
pub const ENV_SYMBOL: &str = "IOPS_BACKEND_SYMBOL";
/// Plugin library path
pub const ENV_LIBRARY: &str = "IOPS_BACKEND_LIBRARY";
/// Verbose backend-resolution diagnostics
pub const ENV_DEBUG: &str = "IOPS_DLOPEN_DEBUG";

/// Which backend to acquire and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend name; `None` picks the platform default
    pub backend: Option<String>,

    /// Plugin constructor symbol (default: `iops_create_<name>_backend`)
    pub symbol: Option<String>,

    /// Plugin library (default: `libiops_<name>.so`)
    pub library: Option<PathBuf>,

    /// Requested procedure-table version
    pub version: u32,

    /// Print resolution diagnostics
    pub debug: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: None,
            symbol: None,
            library: None,
            version: PROCS_VERSION,
            debug: false,
        }
    }
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the selection variables. Only call this at the process
    /// boundary; everything below takes the returned value.
    ///
    /// A non-builtin name without a symbol is rejected here: the
    /// environment alone never names an arbitrary plugin entry point.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            backend: env_get_first(&[ENV_BACKEND, ENV_BACKEND_ALIAS]),
            symbol: env_get_opt(ENV_SYMBOL),
            library: env_get_opt::<String>(ENV_LIBRARY).map(PathBuf::from),
            version: PROCS_VERSION,
            debug: env_get_bool_any(&[ENV_DEBUG]),
        };

        if let Some(name) = &config.backend {
            if !registry::is_builtin(name) && config.symbol.is_none() {
                return Err(IopsError::BadEnvironment(format!(
                    "{ENV_BACKEND}={name} is not builtin and {ENV_SYMBOL} is not set"
                )));
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Select a backend by name
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Override the plugin constructor symbol
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Override the plugin library path
    pub fn library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Request a procedure-table version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable resolution diagnostics
    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// The name that will be resolved
    pub fn resolved_name(&self) -> &str {
        self.backend
            .as_deref()
            .unwrap_or(registry::default_backend_name())
    }

    /// True if resolution goes through the dynamic loader
    pub fn is_plugin(&self) -> bool {
        self.symbol.is_some() || self.library.is_some() || !registry::is_builtin(self.resolved_name())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(PROCS_VERSION_MIN..=PROCS_VERSION).contains(&self.version) {
            return Err(IopsError::PluginVersionMismatch {
                requested: self.version,
                supported: PROCS_VERSION,
            });
        }
        if self.backend.as_deref().map_or(false, str::is_empty) {
            return Err(IopsError::UnknownBackend(String::new()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_platform_backend() {
        let cfg = BackendConfig::new();
        assert_eq!(cfg.version, PROCS_VERSION);
        assert_eq!(cfg.resolved_name(), registry::default_backend_name());
        assert!(!cfg.is_plugin());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let cfg = BackendConfig::new()
            .backend("custom")
            .symbol("make_custom")
            .library("/opt/lib/libcustom.so")
            .version(2)
            .debug(true);
        assert_eq!(cfg.resolved_name(), "custom");
        assert_eq!(cfg.symbol.as_deref(), Some("make_custom"));
        assert_eq!(cfg.version, 2);
        assert!(cfg.debug);
        assert!(cfg.is_plugin());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(matches!(
            BackendConfig::new().version(0).validate(),
            Err(IopsError::PluginVersionMismatch { requested: 0, .. })
        ));
        assert!(matches!(
            BackendConfig::new().version(PROCS_VERSION + 1).validate(),
            Err(IopsError::PluginVersionMismatch { .. })
        ));
        assert!(matches!(
            BackendConfig::new().backend("").validate(),
            Err(IopsError::UnknownBackend(_))
        ));
    }

    // Single test owns the IOPS_* variables to avoid cross-test races
    #[test]
    fn from_env_boundary() {
        for key in [ENV_BACKEND, ENV_BACKEND_ALIAS, ENV_SYMBOL, ENV_LIBRARY, ENV_DEBUG] {
            std::env::remove_var(key);
        }
        assert_eq!(BackendConfig::from_env().unwrap(), BackendConfig::default());

        std::env::set_var(ENV_BACKEND_ALIAS, "select");
        std::env::set_var(ENV_DEBUG, "1");
        let cfg = BackendConfig::from_env().unwrap();
        assert_eq!(cfg.backend.as_deref(), Some("select"));
        assert!(cfg.debug);

        std::env::set_var(ENV_BACKEND, "exotic");
        assert!(matches!(
            BackendConfig::from_env(),
            Err(IopsError::BadEnvironment(_))
        ));

        std::env::set_var(ENV_SYMBOL, "make_exotic");
        std::env::set_var(ENV_LIBRARY, "/tmp/libexotic.so");
        let cfg = BackendConfig::from_env().unwrap();
        assert_eq!(cfg.resolved_name(), "exotic");
        assert_eq!(cfg.library, Some(PathBuf::from("/tmp/libexotic.so")));
        assert!(cfg.is_plugin());

        for key in [ENV_BACKEND, ENV_BACKEND_ALIAS, ENV_SYMBOL, ENV_LIBRARY, ENV_DEBUG] {
            std::env::remove_var(key);
        }
    }
}
