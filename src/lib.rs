//! feed-store - A single-slot persistent feed cache for Rust
//!
//! This library keeps the most recently fetched feed (a list of image
//! records plus the time it was captured) in one durable slot:
//! - Operations run one at a time on a private executor, in submission order
//! - Inserts replace the previous feed all-or-nothing
//! - Pluggable persistence: memory, JSON file or Redis
//! - Pluggable cache operation strategy, with fault injection for tests
//!
//! # Example
//!
//! ```ignore
//! use feed_store::{FeedImageRecord, FeedStore, Retrieval, now_ms};
//! use url::Url;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), feed_store::FeedStoreError> {
//!     let store = FeedStore::open("/var/cache/app/feed.json")?;
//!
//!     let image = FeedImageRecord::new(
//!         Uuid::new_v4(),
//!         Url::parse("https://img.example.com/1.jpg").unwrap(),
//!     )
//!     .with_description("sunset");
//!
//!     store.insert_async(vec![image], now_ms()).await?;
//!
//!     if let Retrieval::Found { images, timestamp } = store.retrieve_async().await? {
//!         println!("{} images cached at {}", images.len(), timestamp);
//!     }
//!
//!     store.close();
//!     Ok(())
//! }
//! ```

mod backend;
pub mod backends;
mod builder;
mod context;
mod error;
mod feed_store;
mod location;
pub mod operation;
mod record;
mod utils;

// Re-export public API
pub use backend::{Backend, SCHEMA_VERSION};
pub use backends::file::{FileBackend, FileBackendConfig};
pub use backends::memory::MemoryBackend;
pub use backends::metrics::{MetricsBackend, MetricsSink, StoreMetric};
pub use backends::redis::{RedisBackend, RedisBackendConfig};
pub use builder::FeedStoreBuilder;
pub use context::{Change, Context};
pub use error::{BackendError, ErrorKind, FeedStoreError};
pub use feed_store::FeedStore;
pub use location::{FeedStoreConfig, StoreLocation};
pub use operation::fault::{FailingOperation, Primitive};
pub use operation::{CacheOperation, DefaultCacheOperation};
pub use record::{CacheRecord, DraftRecord, FeedImageRecord, Retrieval};
pub use utils::now_ms;
