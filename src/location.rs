//! Store locations and configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::Backend;
use crate::backends::file::{FileBackend, FileBackendConfig};
use crate::backends::memory::MemoryBackend;
use crate::backends::redis::{RedisBackend, RedisBackendConfig};
use crate::error::{BackendError, FeedStoreError};

/// Where a feed store keeps its slot.
///
/// Parsed from a location identifier:
/// - `:memory:` or `/dev/null` - in memory, gone when the store is dropped
/// - `redis://...` or `rediss://...` - a Redis server
/// - anything else - path of a JSON file
#[derive(Debug, Clone)]
pub enum StoreLocation {
    Memory,
    File(FileBackendConfig),
    Redis(RedisBackendConfig),
}

impl StoreLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        StoreLocation::File(FileBackendConfig::new(path))
    }

    pub fn redis(url: impl Into<String>) -> Self {
        StoreLocation::Redis(RedisBackendConfig::new(url))
    }

    /// Open the backend for this location.
    ///
    /// Undecodable stored data fails with `SchemaLoad`; everything else with
    /// `AdapterOpen`.
    pub(crate) async fn open(&self) -> Result<Box<dyn Backend>, FeedStoreError> {
        let opened: Result<Box<dyn Backend>, BackendError> = match self {
            StoreLocation::Memory => Ok(Box::new(MemoryBackend::new())),
            StoreLocation::File(config) => FileBackend::open(config.clone())
                .await
                .map(|b| Box::new(b) as Box<dyn Backend>),
            StoreLocation::Redis(config) => RedisBackend::open(config.clone())
                .await
                .map(|b| Box::new(b) as Box<dyn Backend>),
        };

        opened.map_err(|e| match e {
            BackendError::Schema(message) => FeedStoreError::schema_load(self.to_string(), message),
            other => FeedStoreError::adapter_open(self.to_string(), other.to_string()),
        })
    }
}

impl FromStr for StoreLocation {
    type Err = FeedStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FeedStoreError::adapter_open(s, "empty location"));
        }

        if trimmed == ":memory:" || trimmed == "/dev/null" {
            return Ok(StoreLocation::Memory);
        }

        if trimmed.starts_with("redis://") || trimmed.starts_with("rediss://") {
            return Ok(StoreLocation::redis(trimmed));
        }

        Ok(StoreLocation::file(trimmed))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Memory => f.write_str(":memory:"),
            StoreLocation::File(config) => write!(f, "{}", config.path.display()),
            StoreLocation::Redis(config) => f.write_str(&config.url),
        }
    }
}

/// Executor settings for a feed store.
///
/// Where the slot lives is given separately, as a [`StoreLocation`] or an
/// opened backend.
#[derive(Debug, Clone)]
pub struct FeedStoreConfig {
    /// Name of the executor thread.
    ///
    /// Default: `"feed-store"`
    pub thread_name: String,
}

impl Default for FeedStoreConfig {
    fn default() -> Self {
        FeedStoreConfig {
            thread_name: "feed-store".to_string(),
        }
    }
}
