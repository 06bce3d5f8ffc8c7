//! Builder API for opening feed stores.
//!
//! [`FeedStore::open`] covers the common case. The builder adds a custom
//! cache operation, a metrics sink and executor settings.

use std::sync::Arc;

use crate::backends::metrics::MetricsSink;
use crate::error::FeedStoreError;
use crate::feed_store::{BackendSource, FeedStore};
use crate::location::{FeedStoreConfig, StoreLocation};
use crate::operation::{CacheOperation, DefaultCacheOperation};

/// Builder for [`FeedStore`] instances.
///
/// # Example
///
/// ```ignore
/// let store = FeedStore::builder()
///     .location("/var/cache/app/feed.json")
///     .create_dirs(true)
///     .metrics(Arc::new(LogSink))
///     .open()?;
/// ```
pub struct FeedStoreBuilder {
    config: FeedStoreConfig,
    location: StoreLocation,
    // Reported by `open`, so the chain stays infallible.
    location_error: Option<FeedStoreError>,
    operation: Arc<dyn CacheOperation>,
    metrics: Option<Arc<dyn MetricsSink>>,
    create_dirs: bool,
}

impl FeedStoreBuilder {
    /// Start from an in-memory location with the default cache operation.
    pub fn new() -> Self {
        FeedStoreBuilder {
            config: FeedStoreConfig::default(),
            location: StoreLocation::Memory,
            location_error: None,
            operation: Arc::new(DefaultCacheOperation),
            metrics: None,
            create_dirs: false,
        }
    }

    /// Set the location from an identifier. See [`StoreLocation`].
    pub fn location(mut self, location: &str) -> Self {
        match location.parse() {
            Ok(location) => {
                self.location = location;
                self.location_error = None;
            }
            Err(e) => self.location_error = Some(e),
        }
        self
    }

    pub fn store_location(mut self, location: StoreLocation) -> Self {
        self.location = location;
        self.location_error = None;
        self
    }

    pub fn operation(mut self, operation: Arc<dyn CacheOperation>) -> Self {
        self.operation = operation;
        self
    }

    /// Report every backend load and commit to `sink`.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Create missing parent directories of a file location.
    pub fn create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    /// Open the store. Blocks until the backend is ready.
    pub fn open(self) -> Result<FeedStore, FeedStoreError> {
        if let Some(e) = self.location_error {
            return Err(e);
        }

        let mut location = self.location;
        if self.create_dirs
            && let StoreLocation::File(file) = &mut location
        {
            file.create_dirs = true;
        }

        FeedStore::launch(
            self.config,
            BackendSource::Location(location),
            self.operation,
            self.metrics,
        )
    }
}

impl Default for FeedStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
