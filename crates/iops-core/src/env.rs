//! Environment variable utilities
//!
//! Only the configuration boundary reads the environment; the backends
//! themselves take explicit values.
//!
//! ```ignore
//! use iops_core::env::{env_get_bool, env_get_first};
//!
//! let name = env_get_first(&["IOPS_BACKEND", "IOPS_EVENT_PLUGIN_NAME"]);
//! let debug = env_get_bool("IOPS_DLOPEN_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Empty values count as unset.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

/// First non-empty value among several aliases.
pub fn env_get_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env_get_opt::<String>(k))
}

/// True if any of the aliases is set to a true value.
pub fn env_get_bool_any(keys: &[&str]) -> bool {
    keys.iter().any(|k| env_get_bool(k, false))
}
