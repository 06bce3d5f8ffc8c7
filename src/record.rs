use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;
use uuid::Uuid;

use crate::error::BackendError;

/// A single image in a cached feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedImageRecord {
    pub id: Uuid,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeedImageRecord {
    /// Create an image record without location or description.
    pub fn new(id: Uuid, url: Url) -> Self {
        FeedImageRecord {
            id,
            url,
            location: None,
            description: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The payload of the single persisted slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Unix timestamp in milliseconds at which the feed was captured.
    pub timestamp: i64,

    /// Images in feed order.
    pub images: Vec<FeedImageRecord>,
}

impl CacheRecord {
    /// Check the record invariants.
    ///
    /// Image ids must be unique within one record.
    pub fn validate(&self) -> Result<(), BackendError> {
        let mut seen = HashSet::with_capacity(self.images.len());
        for image in &self.images {
            if !seen.insert(image.id) {
                return Err(BackendError::Malformed(format!(
                    "duplicate image id {}",
                    image.id
                )));
            }
        }
        Ok(())
    }
}

/// A freshly allocated record that has not been committed yet.
///
/// Drafts start without a timestamp. A draft that is committed without one is
/// rejected, so a half-built record never reaches storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftRecord {
    timestamp: Option<i64>,
    images: Vec<FeedImageRecord>,
}

impl DraftRecord {
    pub fn set_timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn set_images(&mut self, images: Vec<FeedImageRecord>) -> &mut Self {
        self.images = images;
        self
    }

    pub fn push_image(&mut self, image: FeedImageRecord) -> &mut Self {
        self.images.push(image);
        self
    }

    /// Turn the draft into a validated record.
    pub fn finish(self) -> Result<CacheRecord, BackendError> {
        let Some(timestamp) = self.timestamp else {
            return Err(BackendError::Malformed(
                "record has no timestamp".to_string(),
            ));
        };

        let record = CacheRecord {
            timestamp,
            images: self.images,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Result of a successful retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// The slot is empty.
    Empty,
    /// The slot holds a feed.
    Found {
        images: Vec<FeedImageRecord>,
        timestamp: i64,
    },
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        matches!(self, Retrieval::Empty)
    }
}

impl From<Option<CacheRecord>> for Retrieval {
    fn from(record: Option<CacheRecord>) -> Self {
        match record {
            Some(CacheRecord { timestamp, images }) => Retrieval::Found { images, timestamp },
            None => Retrieval::Empty,
        }
    }
}
