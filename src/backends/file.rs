use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::backend::{Backend, apply, decode_slot, encode_slot};
use crate::context::Change;
use crate::error::BackendError;
use crate::record::CacheRecord;

/// Configuration for FileBackend.
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    /// Path of the JSON document holding the slot.
    pub path: PathBuf,

    /// `fsync` the document before it replaces the previous one.
    ///
    /// Default: `true`
    pub sync: bool,

    /// Create missing parent directories on open.
    ///
    /// Default: `false` (a missing parent directory fails the open)
    pub create_dirs: bool,
}

impl FileBackendConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileBackendConfig {
            path: path.into(),
            sync: true,
            create_dirs: false,
        }
    }
}

/// JSON file backend with atomic replace.
///
/// Every commit writes the whole slot to a sibling temp file and renames it
/// over the document, so a failed commit leaves the previous document intact.
/// A missing document is an empty slot.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    tmp_path: PathBuf,
    dir: PathBuf,
    sync: bool,
}

impl FileBackend {
    /// Open the document at the configured path.
    ///
    /// Fails with `BackendError::Io` if the location is unusable and with
    /// `BackendError::Schema` if an existing document cannot be decoded.
    pub async fn open(config: FileBackendConfig) -> Result<Self, BackendError> {
        let path = config.path;

        let Some(file_name) = path.file_name() else {
            return Err(BackendError::io(
                "file",
                format!("'{}' does not name a file", path.display()),
            ));
        };
        let mut tmp_name = OsString::from(file_name);
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if config.create_dirs {
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| BackendError::io("file", e))?;
        }
        Self::ensure_dir(&parent).await?;

        if let Ok(meta) = tokio::fs::metadata(&path).await
            && meta.is_dir()
        {
            return Err(BackendError::io(
                "file",
                format!("'{}' is a directory", path.display()),
            ));
        }

        let mut backend = FileBackend {
            path,
            tmp_path,
            dir: parent,
            sync: config.sync,
        };

        // Decode once so a corrupt document fails the open, not the first read.
        backend.load().await?;

        Ok(backend)
    }

    async fn ensure_dir(dir: &Path) -> Result<(), BackendError> {
        let meta = tokio::fs::metadata(dir).await.map_err(|e| {
            BackendError::io("file", format!("directory '{}': {}", dir.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(BackendError::io(
                "file",
                format!("'{}' is not a directory", dir.display()),
            ));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_tmp(&self, data: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(&self.tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        if self.sync {
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Persist the rename itself by syncing the containing directory.
    async fn sync_dir(&self) -> std::io::Result<()> {
        tokio::fs::File::open(&self.dir).await?.sync_all().await
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&mut self) -> Result<Option<CacheRecord>, BackendError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => decode_slot(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io("file", e)),
        }
    }

    async fn commit(&mut self, change: &Change) -> Result<(), BackendError> {
        let data = encode_slot(apply(change))?;

        // Write to temp file first, then rename (atomic)
        if let Err(e) = self.write_tmp(data.as_bytes()).await {
            let _ = tokio::fs::remove_file(&self.tmp_path).await;
            return Err(BackendError::io("file", e));
        }

        if let Err(e) = tokio::fs::rename(&self.tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&self.tmp_path).await;
            return Err(BackendError::io("file", e));
        }

        // The new document is already in place, so a failure here is not a
        // failed commit.
        if self.sync
            && let Err(e) = self.sync_dir().await
        {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to sync directory after replacing slot document"
            );
        }

        tracing::debug!(
            path = %self.path.display(),
            change = change.label(),
            bytes = data.len(),
            "slot document replaced"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeedImageRecord;
    use url::Url;
    use uuid::Uuid;

    fn record(timestamp: i64) -> CacheRecord {
        CacheRecord {
            timestamp,
            images: vec![
                FeedImageRecord::new(Uuid::from_u128(1), Url::parse("http://a").unwrap())
                    .with_location("Porto"),
                FeedImageRecord::new(Uuid::from_u128(2), Url::parse("http://b").unwrap())
                    .with_description("bridge"),
            ],
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::open(FileBackendConfig::new(dir.path().join("feed.json")))
            .await
            .unwrap();

        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");

        let mut backend = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap();
        backend.commit(&Change::Replace(record(5))).await.unwrap();
        drop(backend);

        let mut reopened = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(record(5)));
        assert!(!dir.path().join("feed.json.tmp").exists());

        reopened.commit(&Change::Clear).await.unwrap();
        assert!(reopened.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_with_and_without_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");

        for (sync, timestamp) in [(true, 1), (false, 2), (true, 3)] {
            let config = FileBackendConfig {
                sync,
                ..FileBackendConfig::new(&path)
            };
            let mut backend = FileBackend::open(config).await.unwrap();
            backend
                .commit(&Change::Replace(record(timestamp)))
                .await
                .unwrap();
            backend.sync_dir().await.unwrap();
        }

        let mut reopened = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(record(3)));
    }

    #[tokio::test]
    async fn test_relative_path_syncs_current_dir() {
        let backend = FileBackend::open(FileBackendConfig::new("feed-store-test-relative.json"))
            .await
            .unwrap();
        assert_eq!(backend.dir, PathBuf::from("."));
        backend.sync_dir().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_parent_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("feed.json");

        let err = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
    }

    #[tokio::test]
    async fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feed.json");

        let config = FileBackendConfig {
            create_dirs: true,
            ..FileBackendConfig::new(&path)
        };
        let mut backend = FileBackend::open(config).await.unwrap();
        backend.commit(&Change::Replace(record(1))).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_directory_path_fails_open() {
        let dir = tempfile::tempdir().unwrap();

        let err = FileBackend::open(FileBackendConfig::new(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_open_with_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, "{ definitely not a slot").unwrap();

        let err = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Schema(_)));
    }

    #[tokio::test]
    async fn test_non_utf8_file_fails_open_with_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        let err = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Schema(_)));
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");

        let mut backend = FileBackend::open(FileBackendConfig::new(&path))
            .await
            .unwrap();
        backend.commit(&Change::Replace(record(1))).await.unwrap();

        // A directory squatting on the temp path makes the write fail.
        std::fs::create_dir(dir.path().join("feed.json.tmp")).unwrap();

        let err = backend
            .commit(&Change::Replace(record(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
        assert_eq!(backend.load().await.unwrap(), Some(record(1)));
    }
}
