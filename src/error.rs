/// Error type for feed store operations.
///
/// Operations only ever report `Retrieval`, `Deletion` or `Insertion`.
/// `SchemaLoad` and `AdapterOpen` are returned by construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedStoreError {
    /// Loading the current record failed. The store is unmodified.
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    /// Removing the current record failed. The prior record is still present.
    #[error("deletion failed: {0}")]
    Deletion(String),
    /// Replacing the current record failed. The slot was not half-written.
    #[error("insertion failed: {0}")]
    Insertion(String),
    /// Data found at the location could not be decoded.
    #[error("cannot load schema at '{location}': {message}")]
    SchemaLoad { location: String, message: String },
    /// The location could not be opened.
    #[error("cannot open store at '{location}': {message}")]
    AdapterOpen { location: String, message: String },
}

/// The kind of a [`FeedStoreError`], for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Retrieval,
    Deletion,
    Insertion,
    SchemaLoad,
    AdapterOpen,
}

impl FeedStoreError {
    pub fn retrieval(message: impl Into<String>) -> Self {
        FeedStoreError::Retrieval(message.into())
    }

    pub fn deletion(message: impl Into<String>) -> Self {
        FeedStoreError::Deletion(message.into())
    }

    pub fn insertion(message: impl Into<String>) -> Self {
        FeedStoreError::Insertion(message.into())
    }

    pub fn schema_load(location: impl Into<String>, message: impl Into<String>) -> Self {
        FeedStoreError::SchemaLoad {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn adapter_open(location: impl Into<String>, message: impl Into<String>) -> Self {
        FeedStoreError::AdapterOpen {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Build an error of the given operation kind.
    pub(crate) fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        match kind {
            ErrorKind::Retrieval => FeedStoreError::retrieval(message),
            ErrorKind::Deletion => FeedStoreError::deletion(message),
            ErrorKind::Insertion => FeedStoreError::insertion(message),
            ErrorKind::SchemaLoad => FeedStoreError::schema_load("", message),
            ErrorKind::AdapterOpen => FeedStoreError::adapter_open("", message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedStoreError::Retrieval(_) => ErrorKind::Retrieval,
            FeedStoreError::Deletion(_) => ErrorKind::Deletion,
            FeedStoreError::Insertion(_) => ErrorKind::Insertion,
            FeedStoreError::SchemaLoad { .. } => ErrorKind::SchemaLoad,
            FeedStoreError::AdapterOpen { .. } => ErrorKind::AdapterOpen,
        }
    }

    /// Reclassify an error as `kind`, keeping its message.
    ///
    /// Every failing step of an operation is reported with the operation's
    /// kind, e.g. a failed delete step inside an insert is an `Insertion`.
    pub(crate) fn into_kind(self, kind: ErrorKind) -> Self {
        if self.kind() == kind {
            return self;
        }
        FeedStoreError::of_kind(kind, self.to_string())
    }
}

/// Error raised by a persistence backend or a staged [`Context`](crate::Context).
///
/// These never reach callers of [`FeedStore`](crate::FeedStore) operations;
/// they are normalized into [`FeedStoreError`] first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("[{backend}] I/O error: {message}")]
    Io {
        backend: &'static str,
        message: String,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Stored data does not match the expected layout or version.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("redis error: {0}")]
    Redis(String),
    /// A record is still staged in the slot.
    #[error("slot already holds a record; remove it before allocating")]
    SlotOccupied,
    /// A staged record failed validation.
    #[error("malformed record: {0}")]
    Malformed(String),
    /// Raised on purpose by test backends.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl BackendError {
    pub fn io(backend: &'static str, err: impl std::fmt::Display) -> Self {
        BackendError::Io {
            backend,
            message: err.to_string(),
        }
    }
}
