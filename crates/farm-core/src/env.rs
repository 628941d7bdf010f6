//! Environment variable utilities
//!
//! Every tunable of the farm can be overridden through a `FARM_*`
//! variable. Unset or unparsable values fall back to the default.
//!
//! ```ignore
//! use farm_core::env::{env_get, env_get_path};
//!
//! let workers: usize = env_get("FARM_WORKERS", 4);
//! let socket = env_get_path("FARM_SOCKET", "./farm.sck");
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or return `default`
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
///
/// `None` when the variable is unset or does not parse.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Milliseconds from the environment as a `Duration`
#[inline]
pub fn env_get_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Filesystem path from the environment; empty values are ignored
pub fn env_get_path(key: &str, default: &str) -> PathBuf {
    match std::env::var_os(key) {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__FARM_TEST_UNSET_12345__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_bool_default() {
        assert!(env_get_bool("__FARM_TEST_UNSET_12345__", true));
        assert!(!env_get_bool("__FARM_TEST_UNSET_12345__", false));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__FARM_TEST_NUM__", " 17 ");
        let val: usize = env_get("__FARM_TEST_NUM__", 0);
        assert_eq!(val, 17);
        std::env::remove_var("__FARM_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__FARM_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__FARM_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__FARM_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_duration() {
        std::env::set_var("__FARM_TEST_MS__", "250");
        assert_eq!(
            env_get_duration_ms("__FARM_TEST_MS__", 1),
            Duration::from_millis(250)
        );
        std::env::remove_var("__FARM_TEST_MS__");
        assert_eq!(
            env_get_duration_ms("__FARM_TEST_MS__", 1),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_env_get_path_empty_is_default() {
        std::env::set_var("__FARM_TEST_PATH__", "");
        assert_eq!(
            env_get_path("__FARM_TEST_PATH__", "./farm.sck"),
            PathBuf::from("./farm.sck")
        );
        std::env::set_var("__FARM_TEST_PATH__", "/tmp/x.sck");
        assert_eq!(
            env_get_path("__FARM_TEST_PATH__", "./farm.sck"),
            PathBuf::from("/tmp/x.sck")
        );
        std::env::remove_var("__FARM_TEST_PATH__");
    }
}
