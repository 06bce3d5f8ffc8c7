//! Backend implementations for the feed store.

pub mod file;
pub mod memory;
pub mod metrics;
pub mod redis;

pub use file::{FileBackend, FileBackendConfig};
pub use memory::MemoryBackend;
pub use metrics::{MetricsBackend, MetricsSink, StoreMetric};
pub use redis::{RedisBackend, RedisBackendConfig};
