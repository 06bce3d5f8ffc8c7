//! Staged transaction over the single slot.
//!
//! A [`Context`] is built from the record a backend loaded. Removing and
//! allocating only change the context; nothing reaches storage until the
//! executor turns the context into a [`Change`] and hands it to
//! [`Backend::commit`](crate::Backend::commit). Dropping a context discards
//! everything it staged.

use crate::error::BackendError;
use crate::record::{CacheRecord, DraftRecord};

/// A change to apply to the slot in one atomic commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Replace whatever is in the slot with this record.
    Replace(CacheRecord),
    /// Empty the slot.
    Clear,
}

impl Change {
    /// A short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Change::Replace(_) => "replace",
            Change::Clear => "clear",
        }
    }
}

/// Staged transaction over one loaded snapshot of the slot.
#[derive(Debug)]
pub struct Context {
    loaded: Option<CacheRecord>,
    removed: bool,
    draft: Option<DraftRecord>,
}

impl Context {
    /// Start a transaction over the record currently committed in the slot.
    pub fn begin(loaded: Option<CacheRecord>) -> Self {
        Context {
            loaded,
            removed: false,
            draft: None,
        }
    }

    /// The committed record, unless it was removed in this transaction.
    ///
    /// Drafts are not visible until they are committed.
    pub fn fetch(&self) -> Option<&CacheRecord> {
        if self.removed {
            return None;
        }
        self.loaded.as_ref()
    }

    /// Stage removal of the current record.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn remove(&mut self) -> bool {
        if self.loaded.is_none() || self.removed {
            return false;
        }
        self.removed = true;
        true
    }

    /// Allocate a new, empty record in the slot.
    ///
    /// The slot holds at most one record, so the current record has to be
    /// removed first.
    pub fn allocate(&mut self) -> Result<&mut DraftRecord, BackendError> {
        if self.fetch().is_some() || self.draft.is_some() {
            return Err(BackendError::SlotOccupied);
        }
        Ok(self.draft.insert(DraftRecord::default()))
    }

    /// Close the transaction, producing the change to commit.
    ///
    /// Returns `Ok(None)` when nothing was staged. A staged draft is
    /// validated here; a malformed draft fails the whole transaction.
    pub fn into_change(self) -> Result<Option<Change>, BackendError> {
        match self.draft {
            Some(draft) => Ok(Some(Change::Replace(draft.finish()?))),
            None if self.removed => Ok(Some(Change::Clear)),
            None => Ok(None),
        }
    }
}
