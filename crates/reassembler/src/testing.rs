//! Fixtures shared by the crate's tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chunklift_protocol::{ProcessingQueueItem, QueueStatus, UploadMetadata};
use chunklift_registry::{
    FailureOutcome, JobRegistry, MemoryRegistry, NewJob, ProcessingQueue, RegistryError,
    RegistryFuture,
};
use chunklift_storage::{
    FsObjectStore, ObjectReader, ObjectStore, ObjectWriter, PutOptions, StorageError,
    StoreFuture,
};
use chunklift_transfer::{checksum_bytes, chunk_path, plan};

/// Filesystem store that can fail reads of chosen chunks and moves, and
/// records which objects were opened for reading.
pub(crate) struct FlakyStore {
    pub(crate) inner: FsObjectStore,
    failing_reads: Mutex<Vec<(String, u32)>>,
    failing_moves: AtomicU32,
    reads: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub(crate) fn new(root: &std::path::Path) -> Self {
        Self {
            inner: FsObjectStore::new(root),
            failing_reads: Mutex::new(Vec::new()),
            failing_moves: AtomicU32::new(0),
            reads: Mutex::new(Vec::new()),
        }
    }

    /// The next `count` reads of `path` fail.
    pub(crate) fn fail_reads(&self, path: &str, count: u32) {
        self.failing_reads
            .lock()
            .unwrap()
            .push((path.to_string(), count));
    }

    /// The next `count` moves fail.
    pub(crate) fn fail_moves(&self, count: u32) {
        self.failing_moves.store(count, Ordering::SeqCst);
    }

    pub(crate) fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub(crate) fn clear_reads(&self) {
        self.reads.lock().unwrap().clear();
    }

    fn should_fail_read(&self, path: &str) -> bool {
        let mut failing = self.failing_reads.lock().unwrap();
        match failing.iter_mut().find(|(p, n)| p == path && *n > 0) {
            Some((_, n)) => {
                *n -= 1;
                true
            }
            None => false,
        }
    }
}

impl ObjectStore for FlakyStore {
    fn put_object<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        options: &'a PutOptions,
    ) -> StoreFuture<'a, ()> {
        self.inner.put_object(path, data, options)
    }

    fn get_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<u8>> {
        self.inner.get_object(path)
    }

    fn head_object<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<u64>> {
        self.inner.head_object(path)
    }

    fn open_reader<'a>(&'a self, path: &'a str) -> StoreFuture<'a, ObjectReader> {
        self.reads.lock().unwrap().push(path.to_string());
        if self.should_fail_read(path) {
            return Box::pin(async { Err(StorageError::Unavailable("connection reset".into())) });
        }
        self.inner.open_reader(path)
    }

    fn open_writer_at<'a>(&'a self, path: &'a str, offset: u64) -> StoreFuture<'a, ObjectWriter> {
        self.inner.open_writer_at(path, offset)
    }

    fn delete_objects<'a>(&'a self, paths: &'a [String]) -> StoreFuture<'a, ()> {
        self.inner.delete_objects(paths)
    }

    fn move_object<'a>(&'a self, src: &'a str, dst: &'a str) -> StoreFuture<'a, ()> {
        let remaining = self.failing_moves.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_moves.store(remaining - 1, Ordering::SeqCst);
            return Box::pin(async { Err(StorageError::Unavailable("rename failed".into())) });
        }
        self.inner.move_object(src, dst)
    }
}

/// Queue that counts lease renewals and takes the claim away from its
/// caller after `revoke_after` of them, as if another worker had taken the
/// item over.
pub(crate) struct RevokingQueue {
    inner: Arc<MemoryRegistry>,
    revoke_after: u32,
    renewals: AtomicU32,
    revoked: AtomicBool,
}

impl RevokingQueue {
    pub(crate) fn new(inner: Arc<MemoryRegistry>, revoke_after: u32) -> Self {
        Self {
            inner,
            revoke_after,
            renewals: AtomicU32::new(0),
            revoked: AtomicBool::new(false),
        }
    }

    pub(crate) fn renewals(&self) -> u32 {
        self.renewals.load(Ordering::SeqCst)
    }

    fn lease_lost<T: Send + 'static>(item_id: &str, worker_id: &str) -> RegistryFuture<'static, T> {
        let err = RegistryError::LeaseLost {
            item_id: item_id.to_string(),
            worker_id: worker_id.to_string(),
        };
        Box::pin(async move { Err(err) })
    }
}

impl ProcessingQueue for RevokingQueue {
    fn enqueue_processing<'a>(
        &'a self,
        job_id: &'a str,
        upload_path: &'a str,
        total_chunks: u32,
        metadata: UploadMetadata,
    ) -> RegistryFuture<'a, String> {
        self.inner
            .enqueue_processing(job_id, upload_path, total_chunks, metadata)
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
        if self.revoked.load(Ordering::SeqCst) {
            return Self::lease_lost(item_id, worker_id);
        }
        self.inner
            .record_merge_progress(item_id, worker_id, merged_chunks, merged_bytes)
    }

    fn renew_lease<'a>(&'a self, item_id: &'a str, worker_id: &'a str) -> RegistryFuture<'a, ()> {
        let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.revoke_after {
            self.revoked.store(true, Ordering::SeqCst);
        }
        if self.revoked.load(Ordering::SeqCst) {
            return Self::lease_lost(item_id, worker_id);
        }
        self.inner.renew_lease(item_id, worker_id)
    }

    fn complete_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, ()> {
        if self.revoked.load(Ordering::SeqCst) {
            return Self::lease_lost(item_id, worker_id);
        }
        self.inner.complete_queue_item(item_id, worker_id)
    }

    fn fail_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        error: String,
    ) -> RegistryFuture<'a, FailureOutcome> {
        if self.revoked.load(Ordering::SeqCst) {
            return Self::lease_lost(item_id, worker_id);
        }
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

/// Stores `data` as chunks under `upload_path` and queues it, the way the
/// upload client does. Returns `(job_id, item_id)`.
pub(crate) async fn stage_upload(
    store: &dyn ObjectStore,
    registry: &Arc<MemoryRegistry>,
    upload_path: &str,
    data: &[u8],
    chunk_size: u64,
) -> (String, String) {
    let specs = plan(data.len() as u64, chunk_size).unwrap();
    let mut checksums = Vec::new();
    for spec in &specs {
        let bytes = &data[spec.start as usize..spec.end as usize];
        store
            .put_object(&chunk_path(upload_path, spec.index), bytes, &PutOptions::default())
            .await
            .unwrap();
        checksums.push(checksum_bytes(bytes));
    }

    let job_id = registry
        .create_job(NewJob {
            file_name: "clip.mp4".into(),
            file_size: data.len() as u64,
            upload_path: upload_path.into(),
            owner_id: "owner-1".into(),
        })
        .await
        .unwrap();
    let metadata = UploadMetadata {
        file_name: "clip.mp4".into(),
        file_size: data.len() as u64,
        content_type: "video/mp4".into(),
        chunk_size,
        chunk_checksums: checksums,
    };
    let item_id = registry
        .enqueue_processing(&job_id, upload_path, specs.len() as u32, metadata)
        .await
        .unwrap();
    (job_id, item_id)
}

pub(crate) fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}
