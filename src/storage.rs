//! Blob object store.
//!
//! The core classify path only ever *downloads* by key; upload and delete
//! exist for the documents domain. The trait is deliberately narrow so the
//! production backend can be swapped (S3, Azure) without touching the
//! workflow — downloads hand back an `AsyncRead` the caller streams to disk
//! rather than a fully-buffered Vec, keeping memory flat for large scans.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::debug;

/// Blob store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No blob at the given key.
    #[error("blob not found: '{key}'")]
    NotFound { key: String },

    /// Key contains path traversal or other rejected characters.
    #[error("invalid storage key: '{key}'")]
    InvalidKey { key: String },

    /// Underlying filesystem failure.
    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A byte stream returned by [`BlobStore::download`].
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Narrow object-store interface consumed by herald.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing blob.
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Open the blob at `key` for streaming reads.
    async fn download(&self, key: &str) -> Result<BlobReader, StorageError>;

    /// Remove the blob at `key`. Removing a missing key is an error so
    /// compensation paths can log it.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Filesystem-backed blob store rooted at a single directory.
///
/// Keys are slash-separated relative paths (`documents/{uuid}/scan.pdf`);
/// each segment is checked so a key can never escape the root.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the store, creating `root` if it does not exist.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Io {
                key: root.display().to_string(),
                source: e,
            })?;
        Ok(Self { root })
    }

    /// Resolve a key to an absolute path under the root, rejecting
    /// traversal segments.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(StorageError::InvalidKey { key: key.into() });
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::InvalidKey { key: key.into() });
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(key, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_err(key, e))?;
        debug!(key, bytes = bytes.len(), "blob stored");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<BlobReader, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { key: key.into() })
            }
            Err(e) => Err(io_err(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { key: key.into() })
            }
            Err(e) => Err(io_err(key, e)),
        }
    }
}

fn io_err(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.into(),
        source,
    }
}

/// Storage key for a document's PDF blob.
pub fn document_key(id: uuid::Uuid, filename: &str) -> String {
    format!("documents/{id}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();

        store.upload("docs/a/scan.pdf", b"%PDF-1.7").await.unwrap();

        let mut reader = store.download("docs/a/scan.pdf").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"%PDF-1.7");

        store.delete("docs/a/scan.pdf").await.unwrap();
        assert!(matches!(
            store.download("docs/a/scan.pdf").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).await.unwrap();

        for key in ["../escape", "a/../../b", "/absolute", "a//b", ""] {
            assert!(
                matches!(
                    store.download(key).await,
                    Err(StorageError::InvalidKey { .. })
                ),
                "key {key:?} must be rejected"
            );
        }
    }

    #[test]
    fn document_key_shape() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            document_key(id, "scan.pdf"),
            format!("documents/{id}/scan.pdf")
        );
    }
}
