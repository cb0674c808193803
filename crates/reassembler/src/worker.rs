//! Single reassembly worker.

use std::sync::Arc;
use std::time::Duration;

use chunklift_protocol::{JobStatus, ProcessingQueueItem};
use chunklift_registry::{JobRegistry, ProcessingQueue, RegistryError};
use chunklift_storage::{ObjectStore, StorageError};
use chunklift_transfer::{StreamingChecksum, chunk_path, staging_path};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ReassemblyError;

/// Result of processing one claimed queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The merged file is published and the job is completed.
    Completed { item_id: String, job_id: String },
    /// The attempt failed and was recorded on the queue item.
    Failed {
        item_id: String,
        job_id: String,
        error: String,
        attempts: u32,
        terminal: bool,
    },
}

/// Where a claimed item picks up its merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumePoint {
    /// The merged file was moved into place by an earlier attempt that died
    /// before completing the item; only cleanup is left.
    Published,
    /// Every chunk is already in the staging object.
    Finalize { merged_bytes: u64 },
    /// Append chunks from `chunk` onwards after truncating to `offset`.
    Merge { chunk: u32, offset: u64 },
}

/// Claims queue items and turns their chunks into one published file.
pub struct Reassembler {
    store: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobRegistry>,
    queue: Arc<dyn ProcessingQueue>,
    worker_id: String,
    buffer_size: usize,
    lease_renewal: Duration,
}

impl Reassembler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobRegistry>,
        queue: Arc<dyn ProcessingQueue>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            jobs,
            queue,
            worker_id: worker_id.into(),
            buffer_size: 64 * 1024,
            lease_renewal: Duration::from_secs(60),
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Interval between lease renewals while a chunk is streamed.
    pub fn with_lease_renewal(mut self, interval: Duration) -> Self {
        self.lease_renewal = interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claims and processes the next eligible item.
    ///
    /// Returns `Ok(None)` when the queue has nothing to hand out. Failures of
    /// the item itself are recorded on the queue and reported through
    /// [`ProcessOutcome::Failed`]; only registry errors while claiming are
    /// returned as `Err`.
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>, ReassemblyError> {
        let Some(item) = self.queue.claim_queue_item(&self.worker_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.process_item(item).await))
    }

    /// Processes an item this worker has already claimed.
    pub async fn process_item(&self, item: ProcessingQueueItem) -> ProcessOutcome {
        info!(
            worker = %self.worker_id,
            item = %item.id,
            job = %item.job_id,
            chunks = item.total_chunks,
            attempt = item.attempts + 1,
            "reassembling upload"
        );

        match self.reassemble(&item).await {
            Ok(()) => {
                info!(worker = %self.worker_id, item = %item.id, path = %item.upload_path, "upload published");
                ProcessOutcome::Completed {
                    item_id: item.id,
                    job_id: item.job_id,
                }
            }
            Err(e) => self.record_failure(item, e).await,
        }
    }

    async fn reassemble(&self, item: &ProcessingQueueItem) -> Result<(), ReassemblyError> {
        self.jobs
            .update_job_status(&item.job_id, JobStatus::Processing, None)
            .await?;

        let staging = staging_path(&item.upload_path);
        let merged_bytes = match self.resume_point(item, &staging).await? {
            ResumePoint::Published => {
                info!(item = %item.id, "upload already published, finishing cleanup");
                return self.finish(item).await;
            }
            ResumePoint::Finalize { merged_bytes } => {
                debug!(item = %item.id, "all chunks already merged, finalizing");
                merged_bytes
            }
            ResumePoint::Merge { chunk, offset } => {
                if chunk > 0 {
                    info!(item = %item.id, from_chunk = chunk, offset, "resuming merge");
                }
                self.merge_chunks(item, &staging, chunk, offset).await?
            }
        };

        self.verify_size(item, &staging, merged_bytes).await?;

        // A worker that lost its claim must not publish over the new owner.
        self.queue.renew_lease(&item.id, &self.worker_id).await?;
        self.store
            .move_object(&staging, &item.upload_path)
            .await
            .map_err(ReassemblyError::Finalize)?;

        self.finish(item).await
    }

    /// Drops the chunk artifacts of a published item and completes it.
    async fn finish(&self, item: &ProcessingQueueItem) -> Result<(), ReassemblyError> {
        self.queue.renew_lease(&item.id, &self.worker_id).await?;
        self.delete_chunks(item).await;

        self.queue
            .complete_queue_item(&item.id, &self.worker_id)
            .await?;
        self.jobs
            .update_job_status(&item.job_id, JobStatus::Completed, None)
            .await?;
        Ok(())
    }

    /// Decides where to resume from the recorded merge offset and the
    /// staging object actually present.
    async fn resume_point(
        &self,
        item: &ProcessingQueueItem,
        staging: &str,
    ) -> Result<ResumePoint, ReassemblyError> {
        if item.merged_chunks == 0 {
            return Ok(ResumePoint::Merge {
                chunk: 0,
                offset: 0,
            });
        }

        let staged = self
            .store
            .head_object(staging)
            .await
            .map_err(|source| ReassemblyError::Merge {
                index: item.merged_chunks,
                source,
            })?;

        if staged.is_none() && item.fully_merged() && self.is_published(item).await? {
            return Ok(ResumePoint::Published);
        }

        Ok(match staged {
            Some(len) if item.fully_merged() && len == item.merged_bytes => ResumePoint::Finalize {
                merged_bytes: item.merged_bytes,
            },
            Some(len) if len >= item.merged_bytes => ResumePoint::Merge {
                chunk: item.merged_chunks,
                offset: item.merged_bytes,
            },
            _ => {
                warn!(
                    item = %item.id,
                    recorded = item.merged_bytes,
                    staged = ?staged,
                    "staging object shorter than recorded offset, restarting merge"
                );
                ResumePoint::Merge {
                    chunk: 0,
                    offset: 0,
                }
            }
        })
    }

    /// Whether the canonical object already holds the fully merged upload.
    async fn is_published(&self, item: &ProcessingQueueItem) -> Result<bool, ReassemblyError> {
        let published = self
            .store
            .head_object(&item.upload_path)
            .await
            .map_err(ReassemblyError::Finalize)?;
        let expected = item.metadata.file_size;
        Ok(published == Some(item.merged_bytes)
            && (expected == item.merged_bytes || expected == 0))
    }

    /// Appends chunks `from..total_chunks` to the staging object in order.
    /// Returns the staging length after the last chunk.
    async fn merge_chunks(
        &self,
        item: &ProcessingQueueItem,
        staging: &str,
        from: u32,
        offset: u64,
    ) -> Result<u64, ReassemblyError> {
        self.queue.renew_lease(&item.id, &self.worker_id).await?;
        let mut renewed_at = Instant::now();
        let mut writer = self
            .store
            .open_writer_at(staging, offset)
            .await
            .map_err(|source| ReassemblyError::Merge {
                index: from,
                source,
            })?;

        let mut buf = vec![0u8; self.buffer_size];
        let mut merged = offset;

        for index in from..item.total_chunks {
            let path = chunk_path(&item.upload_path, index);
            let mut reader = self
                .store
                .open_reader(&path)
                .await
                .map_err(|source| ReassemblyError::Download { index, source })?;

            let mut checksum = StreamingChecksum::new();
            loop {
                let n = reader
                    .read(&mut buf)
                    .await
                    .map_err(|e| ReassemblyError::Download {
                        index,
                        source: e.into(),
                    })?;
                if n == 0 {
                    break;
                }
                checksum.update(&buf[..n]);

                if renewed_at.elapsed() >= self.lease_renewal {
                    self.queue.renew_lease(&item.id, &self.worker_id).await?;
                    renewed_at = Instant::now();
                }
                writer
                    .write_all(&buf[..n])
                    .await
                    .map_err(|e| merge_io(index, e))?;
            }

            let chunk_bytes = checksum.bytes();
            let actual = checksum.finalize();
            if let Some(expected) = item.metadata.checksum_for(index)
                && expected != actual
            {
                return Err(ReassemblyError::ChecksumMismatch {
                    index,
                    expected: expected.to_string(),
                    actual,
                });
            }

            writer.flush().await.map_err(|e| merge_io(index, e))?;
            merged += chunk_bytes;

            self.queue
                .record_merge_progress(&item.id, &self.worker_id, index + 1, merged)
                .await?;
            renewed_at = Instant::now();
            debug!(item = %item.id, chunk = index, bytes = chunk_bytes, merged, "chunk merged");
        }

        writer
            .shutdown()
            .await
            .map_err(|e| merge_io(item.total_chunks, e))?;
        Ok(merged)
    }

    async fn verify_size(
        &self,
        item: &ProcessingQueueItem,
        staging: &str,
        merged_bytes: u64,
    ) -> Result<(), ReassemblyError> {
        let expected = item.metadata.file_size;
        // Metadata without a size is only trusted for empty uploads.
        if expected == 0 && item.total_chunks > 0 {
            return Ok(());
        }

        let staged = self
            .store
            .head_object(staging)
            .await
            .map_err(ReassemblyError::Finalize)?
            .unwrap_or(0);
        if staged != expected || merged_bytes != expected {
            return Err(ReassemblyError::SizeMismatch {
                expected,
                actual: staged,
            });
        }
        Ok(())
    }

    /// Deletes chunk artifacts of a published item. Failures only leave
    /// orphaned chunks behind, so they are logged and ignored.
    async fn delete_chunks(&self, item: &ProcessingQueueItem) {
        let paths: Vec<String> = (0..item.total_chunks)
            .map(|i| chunk_path(&item.upload_path, i))
            .collect();
        if paths.is_empty() {
            return;
        }
        match self.store.delete_objects(&paths).await {
            Ok(()) => debug!(item = %item.id, chunks = paths.len(), "chunk artifacts deleted"),
            Err(e) => warn!(item = %item.id, error = %e, "failed to delete chunk artifacts"),
        }
    }

    async fn record_failure(&self, item: ProcessingQueueItem, err: ReassemblyError) -> ProcessOutcome {
        let message = err.to_string();
        error!(worker = %self.worker_id, item = %item.id, error = %message, "reassembly failed");

        let (attempts, terminal) = match self
            .queue
            .fail_queue_item(&item.id, &self.worker_id, message.clone())
            .await
        {
            Ok(outcome) => {
                if outcome.terminal {
                    error!(item = %item.id, job = %item.job_id, attempts = outcome.attempts, "giving up on upload");
                }
                (outcome.attempts, outcome.terminal)
            }
            Err(RegistryError::LeaseLost { .. }) => {
                warn!(item = %item.id, "lease lost, another worker owns the item now");
                (item.attempts, false)
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "failed to record reassembly failure");
                (item.attempts, false)
            }
        };

        ProcessOutcome::Failed {
            item_id: item.id,
            job_id: item.job_id,
            error: message,
            attempts,
            terminal,
        }
    }
}

fn merge_io(index: u32, err: std::io::Error) -> ReassemblyError {
    ReassemblyError::Merge {
        index,
        source: StorageError::Io(err),
    }
}
