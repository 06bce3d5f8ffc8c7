//! Shared utilities for the feed store.

use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

/// Build a composite key from namespace and key.
///
/// Format: `{namespace}::{key}`
pub fn build_cache_key<N: Display>(namespace: &N, key: &str) -> String {
    format!("{}::{}", namespace, key)
}

/// Get the current time in milliseconds since UNIX epoch.
///
/// Returns `0` if the system clock is set before the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_key() {
        let key = build_cache_key(&"feed_store", "feed");
        assert_eq!(key, "feed_store::feed");
    }

    #[test]
    fn test_now_ms_is_positive() {
        let now = now_ms();
        assert!(now > 0);
    }
}
