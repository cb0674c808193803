//! Filesystem-backed object store.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::store::{ObjectReader, ObjectStore, ObjectWriter, PutOptions, StoreFuture};

/// Stores objects as files below a root directory.
///
/// Puts write to a temporary sibling and rename it into place, so a
/// concurrent reader never observes a half-written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves an object key to a path below the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        chunklift_transfer::validate_upload_path(key)
            .map_err(|e| StorageError::InvalidPath(e.to_string()))?;
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<(), StorageError> {
        let full_path = self.resolve(key)?;
        if !options.upsert && tokio::fs::try_exists(&full_path).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Self::ensure_parent(&full_path).await?;

        let tmp_path = full_path.with_file_name(format!(
            ".{}.tmp-{}",
            full_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            uuid::Uuid::new_v4().simple()
        ));

        // Removes the temp file on every exit, including a dropped future.
        let tmp = TempFile::new(tmp_path);
        let mut file = tokio::fs::File::create(tmp.path()).await?;
        file.write_all(data).await?;
        file.sync_data().await?;
        drop(file);

        tokio::fs::rename(tmp.path(), &full_path).await?;
        tmp.keep();

        debug!(
            key,
            bytes = data.len(),
            content_type = options.content_type.as_deref().unwrap_or(""),
            "object stored"
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.resolve(key)?;
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| StorageError::from_io(e, key))
    }

    async fn head(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let full_path = self.resolve(key)?;
        match tokio::fs::metadata(&full_path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn reader(&self, key: &str) -> Result<ObjectReader, StorageError> {
        let full_path = self.resolve(key)?;
        let file = tokio::fs::File::open(&full_path)
            .await
            .map_err(|e| StorageError::from_io(e, key))?;
        Ok(Box::new(file))
    }

    async fn writer_at(&self, key: &str, offset: u64) -> Result<ObjectWriter, StorageError> {
        let full_path = self.resolve(key)?;
        Self::ensure_parent(&full_path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&full_path)
            .await?;

        let len = file.metadata().await?.len();
        if len < offset {
            return Err(StorageError::SizeMismatch {
                path: key.to_string(),
                expected: offset,
                actual: len,
            });
        }
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::new(file))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            let full_path = self.resolve(key)?;
            match tokio::fs::remove_file(&full_path).await {
                Ok(()) => debug!(key = %key, "object deleted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to delete object");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.resolve(src)?;
        let dst_path = self.resolve(dst)?;
        Self::ensure_parent(&dst_path).await?;
        tokio::fs::rename(&src_path, &dst_path)
            .await
            .map_err(|e| StorageError::from_io(e, src))
    }
}

/// Temporary file that is deleted when dropped unless kept.
struct TempFile {
    path: PathBuf,
    keep: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing to clean up.
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temporary object removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove temporary object"),
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn put_object<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        options: &'a PutOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.put(path, data, options))
    }

    fn get_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(self.get(path))
    }

    fn head_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<u64>> {
        Box::pin(self.head(path))
    }

    fn open_reader<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ObjectReader> {
        Box::pin(self.reader(path))
    }

    fn open_writer_at<'a>(&'a self, path: &'a str, offset: u64) -> StoreFuture<'a, ObjectWriter> {
        Box::pin(self.writer_at(path, offset))
    }

    fn delete_objects<'a>(&'a self, paths: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(self.delete(paths))
    }

    fn move_object<'a>(&'a self, src: &'a str, dst: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.rename(src, dst))
    }
}
