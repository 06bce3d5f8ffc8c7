use async_trait::async_trait;

use crate::backend::{Backend, apply};
use crate::context::Change;
use crate::error::BackendError;
use crate::record::CacheRecord;

/// In-memory backend.
///
/// Content lives as long as the backend does. Used for the `:memory:` and
/// `/dev/null` locations and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Option<CacheRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Create a backend whose slot already holds `record`.
    pub fn with_record(record: CacheRecord) -> Self {
        MemoryBackend { slot: Some(record) }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&mut self) -> Result<Option<CacheRecord>, BackendError> {
        Ok(self.slot.clone())
    }

    async fn commit(&mut self, change: &Change) -> Result<(), BackendError> {
        self.slot = apply(change).cloned();
        Ok(())
    }
}
