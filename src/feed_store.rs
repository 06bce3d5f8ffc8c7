use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};

use crate::backend::Backend;
use crate::backends::metrics::{MetricsBackend, MetricsSink};
use crate::builder::FeedStoreBuilder;
use crate::context::Context;
use crate::error::{ErrorKind, FeedStoreError};
use crate::location::{FeedStoreConfig, StoreLocation};
use crate::operation::{CacheOperation, DefaultCacheOperation};
use crate::record::{FeedImageRecord, Retrieval};

type Callback<T> = Box<dyn FnOnce(Result<T, FeedStoreError>) + Send + 'static>;

/// A completion callback that runs exactly once.
///
/// If it is dropped without being completed (the executor stopped before
/// running the command) the callback receives a failure of the operation's
/// kind instead.
struct Completion<T> {
    callback: Option<Callback<T>>,
    kind: ErrorKind,
}

impl<T> Completion<T> {
    fn new<F>(kind: ErrorKind, callback: F) -> Self
    where
        F: FnOnce(Result<T, FeedStoreError>) + Send + 'static,
    {
        Completion {
            callback: Some(Box::new(callback)),
            kind,
        }
    }

    fn complete(mut self, outcome: Result<T, FeedStoreError>) {
        if let Some(callback) = self.callback.take() {
            invoke(callback, outcome);
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            invoke(
                callback,
                Err(FeedStoreError::of_kind(
                    self.kind,
                    "feed store executor stopped before running the operation",
                )),
            );
        }
    }
}

/// Run a callback, keeping a panic inside it from taking the executor down.
fn invoke<T>(callback: Callback<T>, outcome: Result<T, FeedStoreError>) {
    if panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
        tracing::error!("feed store completion callback panicked");
    }
}

enum Command {
    Retrieve(Completion<Retrieval>),
    Insert {
        images: Vec<FeedImageRecord>,
        timestamp: i64,
        done: Completion<()>,
    },
    Delete(Completion<()>),
}

/// Where the executor gets its backend from.
pub(crate) enum BackendSource {
    Location(StoreLocation),
    Ready(Box<dyn Backend>),
}

impl BackendSource {
    async fn open(self) -> Result<Box<dyn Backend>, FeedStoreError> {
        match self {
            BackendSource::Location(location) => location.open().await,
            BackendSource::Ready(backend) => Ok(backend),
        }
    }
}

/// Single-slot persistent feed cache.
///
/// Every operation is queued on a private executor thread that owns the
/// backend, so operations run one at a time, in submission order, and never
/// interleave. `FeedStore` is `Send + Sync`; share it with `Arc`.
///
/// Completion callbacks run on the executor thread. Callers that need the
/// outcome on another thread must hop there themselves, and should keep
/// callbacks short since the next operation waits for them.
///
/// # Example
///
/// ```ignore
/// let store = FeedStore::open("/var/cache/app/feed.json")?;
///
/// store.insert(images, now_ms(), |result| {
///     if let Err(e) = result {
///         eprintln!("cache write failed: {e}");
///     }
/// });
///
/// match store.retrieve_async().await? {
///     Retrieval::Found { images, timestamp } => { /* ... */ }
///     Retrieval::Empty => { /* ... */ }
/// }
/// ```
pub struct FeedStore {
    commands: mpsc::UnboundedSender<Command>,
    executor: thread::JoinHandle<()>,
    location: String,
}

impl FeedStore {
    /// Open a store at `location` with the default cache operation.
    ///
    /// Returns once the backend is open and its current content decoded.
    /// See [`StoreLocation`] for the location syntax.
    pub fn open(location: &str) -> Result<Self, FeedStoreError> {
        Self::open_with(location, Arc::new(DefaultCacheOperation))
    }

    /// Open a store at `location` with a custom cache operation.
    pub fn open_with(
        location: &str,
        operation: Arc<dyn CacheOperation>,
    ) -> Result<Self, FeedStoreError> {
        let location: StoreLocation = location.parse()?;
        Self::launch(
            FeedStoreConfig::default(),
            BackendSource::Location(location),
            operation,
            None,
        )
    }

    /// Run a store over an already opened backend.
    pub fn with_backend<B>(
        backend: B,
        operation: Arc<dyn CacheOperation>,
    ) -> Result<Self, FeedStoreError>
    where
        B: Backend + 'static,
    {
        Self::launch(
            FeedStoreConfig::default(),
            BackendSource::Ready(Box::new(backend)),
            operation,
            None,
        )
    }

    pub fn builder() -> FeedStoreBuilder {
        FeedStoreBuilder::new()
    }

    /// Start the executor thread and wait until its backend is open.
    pub(crate) fn launch(
        config: FeedStoreConfig,
        source: BackendSource,
        operation: Arc<dyn CacheOperation>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self, FeedStoreError> {
        let location = match &source {
            BackendSource::Location(location) => location.to_string(),
            BackendSource::Ready(backend) => format!("<{}>", backend.name()),
        };

        let (commands, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let label = location.clone();
        let executor = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(FeedStoreError::adapter_open(
                            label,
                            format!("cannot start executor runtime: {}", e),
                        )));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let backend = match source.open().await {
                        Ok(backend) => backend,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let backend: Box<dyn Backend> = match &metrics {
                        Some(sink) => Box::new(MetricsBackend::new(backend, sink.clone())),
                        None => backend,
                    };
                    let _ = ready_tx.send(Ok(()));

                    Executor {
                        backend,
                        operation,
                        location: label.clone(),
                    }
                    .run(receiver)
                    .await;

                    if let Some(sink) = metrics
                        && let Err(e) = sink.flush().await
                    {
                        tracing::warn!(location = %label, error = %e, "failed to flush store metrics");
                    }
                });
            })
            .map_err(|e| {
                FeedStoreError::adapter_open(
                    location.clone(),
                    format!("cannot spawn executor thread: {}", e),
                )
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(location = %location, "feed store opened");
                Ok(FeedStore {
                    commands,
                    executor,
                    location,
                })
            }
            Ok(Err(e)) => {
                let _ = executor.join();
                tracing::warn!(location = %location, error = %e, "feed store open failed");
                Err(e)
            }
            Err(_) => {
                let _ = executor.join();
                Err(FeedStoreError::adapter_open(
                    location,
                    "executor exited while opening",
                ))
            }
        }
    }

    /// The location this store was opened at.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Retrieve the cached feed.
    ///
    /// Has no side effects. `on_done` runs exactly once, on the executor thread.
    pub fn retrieve<F>(&self, on_done: F)
    where
        F: FnOnce(Result<Retrieval, FeedStoreError>) + Send + 'static,
    {
        self.submit(Command::Retrieve(Completion::new(
            ErrorKind::Retrieval,
            on_done,
        )));
    }

    /// Replace the cached feed with `images` captured at `timestamp`.
    ///
    /// The previous feed is removed and the new one written in one commit.
    /// On failure the slot keeps its previous content. `on_done` runs exactly
    /// once, on the executor thread.
    pub fn insert<F>(&self, images: Vec<FeedImageRecord>, timestamp: i64, on_done: F)
    where
        F: FnOnce(Result<(), FeedStoreError>) + Send + 'static,
    {
        self.submit(Command::Insert {
            images,
            timestamp,
            done: Completion::new(ErrorKind::Insertion, on_done),
        });
    }

    /// Delete the cached feed, if any.
    ///
    /// Deleting an empty cache succeeds. `on_done` runs exactly once, on the
    /// executor thread.
    pub fn delete_cached_feed<F>(&self, on_done: F)
    where
        F: FnOnce(Result<(), FeedStoreError>) + Send + 'static,
    {
        self.submit(Command::Delete(Completion::new(ErrorKind::Deletion, on_done)));
    }

    /// Async form of [`retrieve`](Self::retrieve).
    pub async fn retrieve_async(&self) -> Result<Retrieval, FeedStoreError> {
        let (tx, rx) = oneshot::channel();
        self.retrieve(move |outcome| {
            let _ = tx.send(outcome);
        });
        Self::outcome(rx, ErrorKind::Retrieval).await
    }

    /// Async form of [`insert`](Self::insert).
    pub async fn insert_async(
        &self,
        images: Vec<FeedImageRecord>,
        timestamp: i64,
    ) -> Result<(), FeedStoreError> {
        let (tx, rx) = oneshot::channel();
        self.insert(images, timestamp, move |outcome| {
            let _ = tx.send(outcome);
        });
        Self::outcome(rx, ErrorKind::Insertion).await
    }

    /// Async form of [`delete_cached_feed`](Self::delete_cached_feed).
    pub async fn delete_cached_feed_async(&self) -> Result<(), FeedStoreError> {
        let (tx, rx) = oneshot::channel();
        self.delete_cached_feed(move |outcome| {
            let _ = tx.send(outcome);
        });
        Self::outcome(rx, ErrorKind::Deletion).await
    }

    async fn outcome<T>(
        rx: oneshot::Receiver<Result<T, FeedStoreError>>,
        kind: ErrorKind,
    ) -> Result<T, FeedStoreError> {
        rx.await.unwrap_or_else(|_| {
            Err(FeedStoreError::of_kind(
                kind,
                "operation outcome was never delivered",
            ))
        })
    }

    fn submit(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            tracing::warn!(location = %self.location, "feed store executor is not running");
            // Dropping the command fails its completion.
            drop(command);
        }
    }

    /// Stop accepting operations, run everything already queued, and wait
    /// for the executor thread to exit.
    pub fn close(self) {
        let FeedStore {
            commands,
            executor,
            location,
        } = self;
        drop(commands);

        if executor.thread().id() == thread::current().id() {
            tracing::warn!(location = %location, "feed store closed from its own executor; not joining");
            return;
        }

        if executor.join().is_err() {
            tracing::error!(location = %location, "feed store executor panicked");
        } else {
            tracing::info!(location = %location, "feed store closed");
        }
    }
}

/// Owns the backend and runs queued commands one by one.
struct Executor {
    backend: Box<dyn Backend>,
    operation: Arc<dyn CacheOperation>,
    location: String,
}

impl Executor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(
            location = %self.location,
            backend = self.backend.name(),
            "feed store executor started"
        );

        while let Some(command) = commands.recv().await {
            match command {
                Command::Retrieve(done) => {
                    let outcome = self.retrieve().await;
                    self.log_outcome("retrieve", &outcome);
                    done.complete(outcome);
                }
                Command::Insert {
                    images,
                    timestamp,
                    done,
                } => {
                    let outcome = self.insert(images, timestamp).await;
                    self.log_outcome("insert", &outcome);
                    done.complete(outcome);
                }
                Command::Delete(done) => {
                    let outcome = self.delete().await;
                    self.log_outcome("delete", &outcome);
                    done.complete(outcome);
                }
            }
        }

        tracing::debug!(location = %self.location, "feed store executor stopped");
    }

    async fn retrieve(&mut self) -> Result<Retrieval, FeedStoreError> {
        let context = self.begin(ErrorKind::Retrieval).await?;
        let record = self
            .operation
            .fetch_current(&context)
            .map_err(|e| e.into_kind(ErrorKind::Retrieval))?
            .cloned();
        Ok(Retrieval::from(record))
    }

    async fn insert(
        &mut self,
        images: Vec<FeedImageRecord>,
        timestamp: i64,
    ) -> Result<(), FeedStoreError> {
        let kind = ErrorKind::Insertion;
        let mut context = self.begin(kind).await?;

        self.operation
            .delete_current(&mut context)
            .map_err(|e| e.into_kind(kind))?;
        self.operation
            .create_new(&mut context)
            .map_err(|e| e.into_kind(kind))?
            .set_timestamp(timestamp)
            .set_images(images);

        self.commit(context, kind).await
    }

    async fn delete(&mut self) -> Result<(), FeedStoreError> {
        let kind = ErrorKind::Deletion;
        let mut context = self.begin(kind).await?;

        self.operation
            .delete_current(&mut context)
            .map_err(|e| e.into_kind(kind))?;

        self.commit(context, kind).await
    }

    async fn begin(&mut self, kind: ErrorKind) -> Result<Context, FeedStoreError> {
        let loaded = self
            .backend
            .load()
            .await
            .map_err(|e| FeedStoreError::of_kind(kind, e.to_string()))?;
        Ok(Context::begin(loaded))
    }

    async fn commit(&mut self, context: Context, kind: ErrorKind) -> Result<(), FeedStoreError> {
        let change = context
            .into_change()
            .map_err(|e| FeedStoreError::of_kind(kind, e.to_string()))?;

        let Some(change) = change else {
            return Ok(());
        };

        self.backend
            .commit(&change)
            .await
            .map_err(|e| FeedStoreError::of_kind(kind, e.to_string()))
    }

    fn log_outcome<T>(&self, operation: &'static str, outcome: &Result<T, FeedStoreError>) {
        match outcome {
            Ok(_) => tracing::debug!(location = %self.location, operation, "feed store operation done"),
            Err(e) => tracing::warn!(
                location = %self.location,
                operation,
                error = %e,
                "feed store operation failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;
    use uuid::Uuid;

    fn image(n: u128) -> FeedImageRecord {
        FeedImageRecord::new(
            Uuid::from_u128(n),
            Url::parse(&format!("http://host/{}", n)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_callbacks_run_on_executor_thread() {
        let store = FeedStore::builder()
            .thread_name("feed-store-test")
            .open()
            .unwrap();

        let (tx, rx) = oneshot::channel();
        store.retrieve(move |_| {
            let _ = tx.send(thread::current().name().map(str::to_string));
        });

        assert_eq!(rx.await.unwrap().as_deref(), Some("feed-store-test"));
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_executor() {
        let store = FeedStore::open(":memory:").unwrap();

        store.retrieve(|_| panic!("callback blew up"));

        store.insert_async(vec![image(1)], 10).await.unwrap();
        assert_eq!(
            store.retrieve_async().await.unwrap(),
            Retrieval::Found {
                images: vec![image(1)],
                timestamp: 10
            }
        );
    }

    #[test]
    fn test_close_drains_queue() {
        let store = FeedStore::open(":memory:").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..20 {
            let log = log.clone();
            store.insert(vec![image(n)], n as i64, move |result| {
                assert!(result.is_ok());
                log.lock().unwrap().push(n);
            });
        }
        store.close();

        assert_eq!(*log.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_completion_reports_failure() {
        let outcome = Arc::new(Mutex::new(None));
        let seen = outcome.clone();

        let completion: Completion<()> = Completion::new(ErrorKind::Deletion, move |result| {
            *seen.lock().unwrap() = Some(result);
        });
        drop(completion);

        let result = outcome.lock().unwrap().take().unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Deletion);
    }

    #[test]
    fn test_location_names_the_opened_backend() {
        let store = FeedStore::with_backend(
            crate::backends::memory::MemoryBackend::new(),
            Arc::new(DefaultCacheOperation),
        )
        .unwrap();
        assert_eq!(store.location(), "<memory>");
        store.close();

        let store = FeedStore::open("/dev/null").unwrap();
        assert_eq!(store.location(), ":memory:");
        store.close();
    }

    #[test]
    fn test_open_unparseable_location_fails_fast() {
        let err = FeedStore::open("").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AdapterOpen);
    }
}
