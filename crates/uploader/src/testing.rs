//! In-memory object store with fault injection, shared by the crate's tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chunklift_protocol::{ProcessingQueueItem, QueueStatus, UploadMetadata};
use chunklift_registry::{
    FailureOutcome, MemoryRegistry, ProcessingQueue, RegistryError, RegistryFuture,
};
use chunklift_storage::{
    ObjectReader, ObjectStore, ObjectWriter, PutOptions, StorageError, StoreFuture,
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum FailKind {
    Transient,
    Permanent,
    Hang,
}

#[derive(Default)]
pub(crate) struct MockStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    scripted: Mutex<HashMap<String, (u32, FailKind)>>,
    put_delay: Mutex<Duration>,
    slow_suffixes: Mutex<HashMap<String, Duration>>,
    stored_order: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    puts: AtomicUsize,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every put sleeps for `delay` before completing.
    pub(crate) fn with_put_delay(self, delay: Duration) -> Self {
        *self.put_delay.lock().unwrap() = delay;
        self
    }

    /// The next `count` puts to any path ending in `suffix` fail with `kind`.
    pub(crate) fn fail_next(&self, suffix: &str, count: u32, kind: FailKind) {
        self.scripted
            .lock()
            .unwrap()
            .insert(suffix.to_string(), (count, kind));
    }

    /// The next `count` puts to any path ending in `suffix` never complete.
    pub(crate) fn hang_next(&self, suffix: &str, count: u32) {
        self.fail_next(suffix, count, FailKind::Hang);
    }

    pub(crate) fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Puts to any path ending in `suffix` take an extra `delay`.
    pub(crate) fn slow_puts(&self, suffix: &str, delay: Duration) {
        self.slow_suffixes
            .lock()
            .unwrap()
            .insert(suffix.to_string(), delay);
    }

    /// Paths in the order their puts completed.
    pub(crate) fn stored_order(&self) -> Vec<String> {
        self.stored_order.lock().unwrap().clone()
    }

    pub(crate) fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self, path: &str) -> Option<FailKind> {
        let mut scripted = self.scripted.lock().unwrap();
        let entry = scripted
            .iter_mut()
            .find(|(suffix, _)| path.ends_with(suffix.as_str()))
            .map(|(_, entry)| entry)?;
        if entry.0 == 0 {
            return None;
        }
        entry.0 -= 1;
        Some(entry.1)
    }
}

impl ObjectStore for MockStore {
    fn put_object<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        _options: &'a PutOptions,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let extra = self
                .slow_suffixes
                .lock()
                .unwrap()
                .iter()
                .find(|(suffix, _)| path.ends_with(suffix.as_str()))
                .map(|(_, d)| *d)
                .unwrap_or_default();
            let delay = *self.put_delay.lock().unwrap() + extra;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match self.take_failure(path) {
                Some(FailKind::Transient) => Err(StorageError::Unavailable("503".into())),
                Some(FailKind::Permanent) => Err(StorageError::InvalidPath(path.to_string())),
                Some(FailKind::Hang) => std::future::pending().await,
                None => {
                    self.objects
                        .lock()
                        .unwrap()
                        .insert(path.to_string(), data.to_vec());
                    self.stored_order.lock().unwrap().push(path.to_string());
                    Ok(())
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn get_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.object(path)
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        })
    }

    fn head_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<u64>> {
        Box::pin(async move { Ok(self.object(path).map(|d| d.len() as u64)) })
    }

    fn open_reader<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ObjectReader> {
        Box::pin(async move {
            let data = self
                .object(path)
                .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
            Ok(Box::new(std::io::Cursor::new(data)) as ObjectReader)
        })
    }

    fn open_writer_at<'a>(&'a self, _path: &'a str, _offset: u64) -> StoreFuture<'a, ObjectWriter> {
        Box::pin(async move { Err(StorageError::Unavailable("writers not supported".into())) })
    }

    fn delete_objects<'a>(&'a self, paths: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut objects = self.objects.lock().unwrap();
            for p in paths {
                objects.remove(p);
            }
            Ok(())
        })
    }

    fn move_object<'a>(&'a self, src: &'a str, dst: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut objects = self.objects.lock().unwrap();
            let data = objects
                .remove(src)
                .ok_or_else(|| StorageError::NotFound(src.to_string()))?;
            objects.insert(dst.to_string(), data);
            Ok(())
        })
    }
}

/// Queue whose `enqueue_processing` always fails; every other call goes to
/// the wrapped registry.
pub(crate) struct RejectingQueue {
    pub(crate) inner: Arc<MemoryRegistry>,
}

impl ProcessingQueue for RejectingQueue {
    fn enqueue_processing<'a>(
        &'a self,
        _job_id: &'a str,
        _upload_path: &'a str,
        _total_chunks: u32,
        _metadata: UploadMetadata,
    ) -> RegistryFuture<'a, String> {
        Box::pin(async {
            Err(RegistryError::Io(std::io::Error::other("disk full")))
        })
    }

    fn claim_queue_item<'a>(
        &'a self,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>> {
        self.inner.claim_queue_item(worker_id)
    }

    fn record_merge_progress<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        merged_chunks: u32,
        merged_bytes: u64,
    ) -> RegistryFuture<'a, ()> {
        self.inner
            .record_merge_progress(item_id, worker_id, merged_chunks, merged_bytes)
    }

    fn renew_lease<'a>(&'a self, item_id: &'a str, worker_id: &'a str) -> RegistryFuture<'a, ()> {
        self.inner.renew_lease(item_id, worker_id)
    }

    fn complete_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, ()> {
        self.inner.complete_queue_item(item_id, worker_id)
    }

    fn fail_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        error: String,
    ) -> RegistryFuture<'a, FailureOutcome> {
        self.inner.fail_queue_item(item_id, worker_id, error)
    }

    fn get_queue_item<'a>(
        &'a self,
        item_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>> {
        self.inner.get_queue_item(item_id)
    }

    fn list_queue_items(
        &self,
        status: Option<QueueStatus>,
    ) -> RegistryFuture<'_, Vec<ProcessingQueueItem>> {
        self.inner.list_queue_items(status)
    }
}
