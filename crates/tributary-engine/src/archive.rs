//! Blob-store collaborator and the raw/clean archivers built on it.
//!
//! Stores are opened from URLs the same way for both snapshots:
//! `s3://bucket[/prefix]` (credentials from `AWS_*` env vars),
//! `file:///dir`, or `memory://`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use url::Url;

use crate::errors::StorageError;
use crate::transform::CleanedRecordSet;

/// Key/value blob writer bound to one namespace (bucket, directory, ...).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;
}

/// [`BlobStore`] over any `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Open a store from an `s3://`, `file://` or `memory://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] for unknown schemes or backend setup failures.
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        open_store(url).map(Self::new)
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = Path::parse(key).map_err(|source| StorageError::InvalidKey {
            key: key.to_string(),
            source,
        })?;
        self.store
            .put(&path, bytes.into())
            .await
            .map_err(|source| StorageError::Put {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }
}

fn open_store(raw_url: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let unsupported = || StorageError::UnsupportedUrl {
        url: raw_url.to_string(),
    };
    let url = Url::parse(raw_url).map_err(|_| unsupported())?;

    match url.scheme() {
        "s3" => {
            let store = AmazonS3Builder::from_env()
                .with_url(raw_url)
                .build()
                .map_err(|source| StorageError::Open {
                    url: raw_url.to_string(),
                    source,
                })?;
            let prefix = url.path().trim_matches('/');
            if prefix.is_empty() {
                Ok(Arc::new(store))
            } else {
                Ok(Arc::new(PrefixStore::new(store, prefix)))
            }
        }
        "file" => {
            let dir = url.to_file_path().map_err(|()| unsupported())?;
            std::fs::create_dir_all(&dir)?;
            let store =
                LocalFileSystem::new_with_prefix(&dir).map_err(|source| StorageError::Open {
                    url: raw_url.to_string(),
                    source,
                })?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        _ => Err(unsupported()),
    }
}

/// Writes the raw and clean snapshots, each to its own namespace.
#[derive(Clone)]
pub struct Archiver {
    raw: Arc<dyn BlobStore>,
    clean: Arc<dyn BlobStore>,
}

impl Archiver {
    pub fn new(raw: Arc<dyn BlobStore>, clean: Arc<dyn BlobStore>) -> Self {
        Self { raw, clean }
    }

    /// Both snapshots go to the same namespace.
    pub fn shared(store: Arc<dyn BlobStore>) -> Self {
        Self {
            raw: store.clone(),
            clean: store,
        }
    }

    /// Store the fetched body untouched. Returns the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the blob store rejects the write.
    pub async fn archive_raw(&self, raw: &Bytes, key: &str) -> Result<u64, StorageError> {
        self.raw.put(key, raw.clone()).await?;
        tracing::info!(key, bytes = raw.len(), "Raw snapshot archived");
        Ok(raw.len() as u64)
    }

    /// Serialize the cleaned records as a JSON array and store them.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on serialization or write failure.
    pub async fn archive_clean(
        &self,
        cleaned: &CleanedRecordSet,
        key: &str,
    ) -> Result<u64, StorageError> {
        let body = cleaned.to_snapshot().map_err(StorageError::Serialize)?;
        let len = body.len() as u64;
        self.clean.put(key, body).await?;
        tracing::info!(key, bytes = len, records = cleaned.len(), "Clean snapshot archived");
        Ok(len)
    }
}
