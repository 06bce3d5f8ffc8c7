//! Metrics middleware for backends.
//!
//! This module provides a `MetricsBackend` wrapper that emits metrics for
//! every load and commit to a user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use feed_store::{FeedStore, MemoryBackend, MetricsBackend, MetricsSink};
//!
//! let sink = Arc::new(MyMetricsSink::new());
//! let backend = MetricsBackend::new(Box::new(MemoryBackend::new()), sink.clone());
//! let store = FeedStore::with_backend(backend, Arc::new(DefaultCacheOperation))?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::Backend;
use crate::context::Change;
use crate::error::BackendError;
use crate::record::CacheRecord;

/// Metrics emitted by the MetricsBackend wrapper.
#[derive(Debug, Clone)]
pub enum StoreMetric {
    /// Emitted on every load.
    Load {
        /// Whether the slot held a record.
        hit: bool,
        /// Number of images in the loaded record (only present when hit=true).
        image_count: Option<usize>,
        /// Whether the load succeeded.
        success: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped backend (from Backend::name()).
        backend: String,
    },
    /// Emitted on every commit.
    Commit {
        /// `"replace"` or `"clear"`.
        change: &'static str,
        /// Whether the commit took effect.
        success: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped backend (from Backend::name()).
        backend: String,
    },
}

/// Trait for receiving store metrics.
///
/// Implement this trait to collect metrics from `MetricsBackend`.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called on the store's executor thread, between operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: StoreMetric);

    /// Flush any buffered metrics.
    ///
    /// A feed store calls this once, on its executor thread, after its last
    /// queued operation ran and before the executor exits. A failure is logged.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A backend wrapper that emits metrics for all operations.
pub struct MetricsBackend {
    inner: Box<dyn Backend>,
    sink: Arc<dyn MetricsSink>,
    backend_name: String,
}

impl MetricsBackend {
    /// Create a new MetricsBackend wrapping the given backend.
    ///
    /// # Arguments
    /// * `inner` - The backend to wrap
    /// * `sink` - The metrics sink to emit metrics to
    pub fn new(inner: Box<dyn Backend>, sink: Arc<dyn MetricsSink>) -> Self {
        let backend_name = inner.name().to_string();
        MetricsBackend {
            inner,
            sink,
            backend_name,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Backend for MetricsBackend {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn load(&mut self) -> Result<Option<CacheRecord>, BackendError> {
        let start = Instant::now();
        let result = self.inner.load().await;
        let latency_ms = Self::elapsed_ms(start);

        let (hit, image_count) = match &result {
            Ok(Some(record)) => (true, Some(record.images.len())),
            Ok(None) | Err(_) => (false, None),
        };

        self.sink.emit(StoreMetric::Load {
            hit,
            image_count,
            success: result.is_ok(),
            latency_ms,
            backend: self.backend_name.clone(),
        });

        result
    }

    async fn commit(&mut self, change: &Change) -> Result<(), BackendError> {
        let start = Instant::now();
        let result = self.inner.commit(change).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(StoreMetric::Commit {
            change: change.label(),
            success: result.is_ok(),
            latency_ms,
            backend: self.backend_name.clone(),
        });

        result
    }
}
