//! The object storage contract.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StorageError;

/// Boxed future returned by [`ObjectStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Streaming reader over a stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streaming writer into a stored object.
pub type ObjectWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Options for [`ObjectStore::put_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Overwrite an existing object instead of failing.
    pub upsert: bool,
    pub content_type: Option<String>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            upsert: true,
            content_type: None,
        }
    }
}

/// Storage backend holding chunk artifacts and merged uploads.
///
/// Paths are relative, `/`-separated keys. Implementations must make
/// `put_object` with `upsert` idempotent and `move_object` atomic: a reader
/// either sees the old object at `dst` or the complete new one.
pub trait ObjectStore: Send + Sync {
    /// Stores `data` at `path`.
    fn put_object<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        options: &'a PutOptions,
    ) -> StoreFuture<'a, ()>;

    /// Reads the whole object at `path`.
    fn get_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Returns the size of the object at `path`, or `None` if it does not exist.
    fn head_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<u64>>;

    /// Opens a streaming reader over the object at `path`.
    fn open_reader<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ObjectReader>;

    /// Opens a writer that appends to the object at `path` after truncating
    /// it to `offset` bytes. The object is created when `offset` is 0.
    fn open_writer_at<'a>(&'a self, path: &'a str, offset: u64) -> StoreFuture<'a, ObjectWriter>;

    /// Deletes every object in `paths`. Missing objects are not an error.
    fn delete_objects<'a>(&'a self, paths: &'a [String]) -> StoreFuture<'a, ()>;

    /// Atomically moves `src` to `dst`, replacing any object at `dst`.
    fn move_object<'a>(&'a self, src: &'a str, dst: &'a str) -> StoreFuture<'a, ()>;
}
