//! Environment variable utilities
//!
//! Every runtime knob can be overridden with an `OFL_*` variable; these
//! helpers parse them with a fallback default.
//!
//! ```ignore
//! use offload_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("OFL_WORKER_COUNT", 4);
//! let debug = env_get_bool("OFL_DEBUG", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or `default` if unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true; any other set value is
/// false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Millisecond count read as a `Duration`
#[inline]
pub fn env_get_millis(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__OFL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<usize>("__OFL_TEST_UNSET__").is_none());
        assert_eq!(env_get_str("__OFL_TEST_UNSET__", "x"), "x");
        assert!(!env_is_set("__OFL_TEST_UNSET__"));
    }

    #[test]
    fn test_env_get_parsed() {
        std::env::set_var("__OFL_TEST_NUM__", " 123 ");
        let val: usize = env_get("__OFL_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__OFL_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__OFL_TEST_BAD__", "many");
        let val: usize = env_get("__OFL_TEST_BAD__", 9);
        assert_eq!(val, 9);
        std::env::remove_var("__OFL_TEST_BAD__");
    }

    #[test]
    fn test_env_get_millis() {
        std::env::set_var("__OFL_TEST_MS__", "250");
        assert_eq!(
            env_get_millis("__OFL_TEST_MS__", Duration::ZERO),
            Duration::from_millis(250)
        );
        std::env::remove_var("__OFL_TEST_MS__");
        assert_eq!(
            env_get_millis("__OFL_TEST_MS__", Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("nope", false)] {
            std::env::set_var("__OFL_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__OFL_TEST_BOOL__", !expected), expected, "{}", raw);
        }
        std::env::remove_var("__OFL_TEST_BOOL__");
        assert!(env_get_bool("__OFL_TEST_BOOL__", true));
    }
}
