//! Filesystem blob store.
//!
//! Submitted bytes are written to `<root>/<id>`. Writes go to a temporary
//! sibling first and are renamed into place, so a reader never observes a
//! partially written blob.

use async_trait::async_trait;
use docsift_core::{BlobStore, StoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Blob store keeping one file per document under a root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a blob store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.blob_path(id);
        let tmp = self.root.join(format!("{id}.tmp"));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Stored {} bytes for {} at {:?}", data.len(), id, path);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
