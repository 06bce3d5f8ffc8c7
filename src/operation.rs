//! Cache operation strategies.
//!
//! A [`CacheOperation`] implements the three primitives the feed store builds
//! every operation from. Strategies are stateless and shared between
//! operations as `Arc<dyn CacheOperation>`.

use crate::context::Context;
use crate::error::FeedStoreError;
use crate::record::{CacheRecord, DraftRecord};

/// The primitives a feed store runs against a staged [`Context`].
pub trait CacheOperation: Send + Sync {
    /// Return the current record.
    ///
    /// The response must be `None` when the slot is empty. Fails with
    /// `FeedStoreError::Retrieval`.
    fn fetch_current<'c>(
        &self,
        context: &'c Context,
    ) -> Result<Option<&'c CacheRecord>, FeedStoreError>;

    /// Remove the current record, if any. Fails with `FeedStoreError::Deletion`.
    fn delete_current(&self, context: &mut Context) -> Result<(), FeedStoreError>;

    /// Allocate a new empty record for the caller to populate.
    /// Fails with `FeedStoreError::Insertion`.
    fn create_new<'c>(
        &self,
        context: &'c mut Context,
    ) -> Result<&'c mut DraftRecord, FeedStoreError>;
}

/// Straightforward strategy: operate on the context directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheOperation;

impl CacheOperation for DefaultCacheOperation {
    fn fetch_current<'c>(
        &self,
        context: &'c Context,
    ) -> Result<Option<&'c CacheRecord>, FeedStoreError> {
        Ok(context.fetch())
    }

    fn delete_current(&self, context: &mut Context) -> Result<(), FeedStoreError> {
        if self.fetch_current(context)?.is_some() {
            context.remove();
        }
        Ok(())
    }

    fn create_new<'c>(
        &self,
        context: &'c mut Context,
    ) -> Result<&'c mut DraftRecord, FeedStoreError> {
        context
            .allocate()
            .map_err(|e| FeedStoreError::insertion(e.to_string()))
    }
}

pub mod fault {
    //! Fault injection for testing how the store handles failing primitives.

    use std::sync::Arc;

    use super::{CacheOperation, DefaultCacheOperation};
    use crate::context::Context;
    use crate::error::FeedStoreError;
    use crate::record::{CacheRecord, DraftRecord};

    /// One of the three strategy primitives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Primitive {
        FetchCurrent,
        DeleteCurrent,
        CreateNew,
    }

    /// A strategy that always fails one primitive and delegates the others.
    ///
    /// # Example
    /// ```ignore
    /// let operation = Arc::new(FailingOperation::new(Primitive::DeleteCurrent));
    /// let store = FeedStore::open_with(":memory:", operation)?;
    /// ```
    pub struct FailingOperation {
        failing: Primitive,
        inner: Arc<dyn CacheOperation>,
    }

    impl FailingOperation {
        /// Fail `failing`, delegating to [`DefaultCacheOperation`].
        pub fn new(failing: Primitive) -> Self {
            Self::wrap(failing, Arc::new(DefaultCacheOperation))
        }

        /// Fail `failing`, delegating to `inner`.
        pub fn wrap(failing: Primitive, inner: Arc<dyn CacheOperation>) -> Self {
            FailingOperation { failing, inner }
        }

        pub fn failing(&self) -> Primitive {
            self.failing
        }
    }

    impl CacheOperation for FailingOperation {
        fn fetch_current<'c>(
            &self,
            context: &'c Context,
        ) -> Result<Option<&'c CacheRecord>, FeedStoreError> {
            if self.failing == Primitive::FetchCurrent {
                return Err(FeedStoreError::retrieval("injected fetch failure"));
            }
            self.inner.fetch_current(context)
        }

        fn delete_current(&self, context: &mut Context) -> Result<(), FeedStoreError> {
            if self.failing == Primitive::DeleteCurrent {
                return Err(FeedStoreError::deletion("injected delete failure"));
            }
            self.inner.delete_current(context)
        }

        fn create_new<'c>(
            &self,
            context: &'c mut Context,
        ) -> Result<&'c mut DraftRecord, FeedStoreError> {
            if self.failing == Primitive::CreateNew {
                return Err(FeedStoreError::insertion("injected create failure"));
            }
            self.inner.create_new(context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fault::{FailingOperation, Primitive};
    use super::*;
    use crate::context::Change;
    use crate::error::ErrorKind;
    use crate::record::FeedImageRecord;
    use url::Url;
    use uuid::Uuid;

    fn loaded() -> Context {
        Context::begin(Some(CacheRecord {
            timestamp: 1,
            images: vec![FeedImageRecord::new(
                Uuid::from_u128(1),
                Url::parse("http://a").unwrap(),
            )],
        }))
    }

    #[test]
    fn test_default_delete_then_create() {
        let operation = DefaultCacheOperation;
        let mut context = loaded();

        assert!(operation.create_new(&mut context).is_err());

        operation.delete_current(&mut context).unwrap();
        assert!(operation.fetch_current(&context).unwrap().is_none());

        operation
            .create_new(&mut context)
            .unwrap()
            .set_timestamp(2);
        assert_eq!(
            context.into_change().unwrap(),
            Some(Change::Replace(CacheRecord {
                timestamp: 2,
                images: Vec::new(),
            }))
        );
    }

    #[test]
    fn test_default_delete_on_empty_stages_nothing() {
        let mut context = Context::begin(None);
        DefaultCacheOperation.delete_current(&mut context).unwrap();
        assert_eq!(context.into_change().unwrap(), None);
    }

    #[test]
    fn test_failing_operation_fails_only_its_primitive() {
        let cases = [
            (Primitive::FetchCurrent, ErrorKind::Retrieval),
            (Primitive::DeleteCurrent, ErrorKind::Deletion),
            (Primitive::CreateNew, ErrorKind::Insertion),
        ];

        for (primitive, kind) in cases {
            let operation = FailingOperation::new(primitive);

            let fetch = operation.fetch_current(&loaded()).map(|r| r.cloned());
            let delete = operation.delete_current(&mut loaded());
            let create = operation
                .create_new(&mut Context::begin(None))
                .map(|_| ());

            let errors: Vec<_> = [fetch.err(), delete.err(), create.err()]
                .into_iter()
                .flatten()
                .collect();
            assert_eq!(errors.len(), 1, "{:?}", primitive);
            assert_eq!(errors[0].kind(), kind);
        }
    }
}
