use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Change;
use crate::error::BackendError;
use crate::record::CacheRecord;

/// Version written into every persisted slot envelope.
pub const SCHEMA_VERSION: u32 = 1;

/// A backend is the durable home of the single slot.
///
/// Backends are owned by exactly one feed store executor, which calls them
/// one operation at a time.
#[async_trait]
pub trait Backend: Send {
    /// A name for logs and metrics.
    ///
    /// # Example
    /// - "memory"
    /// - "file"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the committed record.
    ///
    /// The response must be `None` when the slot is empty.
    async fn load(&mut self) -> Result<Option<CacheRecord>, BackendError>;

    /// Durably apply a change.
    ///
    /// Must be atomic: when this returns an error, a following `load` sees
    /// exactly what it saw before the call.
    async fn commit(&mut self, change: &Change) -> Result<(), BackendError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn load(&mut self) -> Result<Option<CacheRecord>, BackendError> {
        (**self).load().await
    }

    async fn commit(&mut self, change: &Change) -> Result<(), BackendError> {
        (**self).commit(change).await
    }
}

/// Persisted layout of the slot, shared by the serializing backends.
#[derive(Debug, Serialize, Deserialize)]
struct SlotEnvelope {
    version: u32,
    cache: Option<CacheRecord>,
}

/// Encode the slot content as a versioned JSON document.
pub(crate) fn encode_slot(record: Option<&CacheRecord>) -> Result<String, BackendError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        cache: Option<&'a CacheRecord>,
    }

    serde_json::to_string(&Borrowed {
        version: SCHEMA_VERSION,
        cache: record,
    })
    .map_err(|e| BackendError::Serialization(format!("Serialization failed: {}", e)))
}

/// Decode and validate a versioned JSON document.
///
/// Bytes that are not a valid document, including invalid UTF-8, are a
/// `BackendError::Schema`.
pub(crate) fn decode_slot(data: impl AsRef<[u8]>) -> Result<Option<CacheRecord>, BackendError> {
    let envelope: SlotEnvelope = serde_json::from_slice(data.as_ref())
        .map_err(|e| BackendError::Schema(format!("Deserialization failed: {}", e)))?;

    if envelope.version != SCHEMA_VERSION {
        return Err(BackendError::Schema(format!(
            "unsupported schema version {} (expected {})",
            envelope.version, SCHEMA_VERSION
        )));
    }

    if let Some(record) = &envelope.cache {
        record
            .validate()
            .map_err(|e| BackendError::Schema(e.to_string()))?;
    }

    Ok(envelope.cache)
}

/// The record a change leaves in the slot.
pub(crate) fn apply(change: &Change) -> Option<&CacheRecord> {
    match change {
        Change::Replace(record) => Some(record),
        Change::Clear => None,
    }
}
