//! Bounded worker pool that pushes a file's chunks through a [`ChunkTransport`].
//!
//! The planned chunks are loaded into a shared work channel in index order.
//! `max_concurrent` workers pull from it, so at most that many transfers are
//! in flight and a free worker always takes the next pending chunk.
//! Completions flow back over a second channel to whoever owns the progress
//! tracker; completion order is not constrained.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chunklift_transfer::{ChunkReader, ChunkSpec, chunk_path};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::UploadError;
use crate::transport::ChunkTransport;

/// A chunk confirmed by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDone {
    pub index: u32,
    pub bytes: u64,
    /// SHA-256 hex checksum of the stored payload.
    pub checksum: String,
    pub attempts: u32,
}

/// Runs chunk transfers with bounded concurrency.
pub struct UploadScheduler {
    transport: Arc<ChunkTransport>,
    max_concurrent: usize,
    inter_chunk_delay: Duration,
}

struct WorkerContext {
    transport: Arc<ChunkTransport>,
    source: PathBuf,
    upload_path: String,
    inter_chunk_delay: Duration,
    cancel: CancellationToken,
}

impl UploadScheduler {
    pub fn new(transport: Arc<ChunkTransport>, max_concurrent: usize) -> Self {
        Self {
            transport,
            max_concurrent: max_concurrent.max(1),
            inter_chunk_delay: Duration::ZERO,
        }
    }

    /// Sets the pause each worker takes after finishing a chunk.
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Starts transferring `chunks` of `source` to `upload_path`.
    ///
    /// `cancel` is owned by this run: the first terminal chunk failure cancels
    /// it so the remaining workers stop. Pass a child of the caller's token
    /// to let an outer cancellation reach every in-flight transfer.
    pub fn start(
        &self,
        source: PathBuf,
        upload_path: String,
        chunks: Vec<ChunkSpec>,
        cancel: CancellationToken,
    ) -> ScheduledRun {
        let capacity = chunks.len().max(1);
        let workers = self.max_concurrent.min(capacity);

        let (work_tx, work_rx) = mpsc::channel(capacity);
        for spec in chunks {
            // Capacity matches the chunk count, so this never fails.
            let _ = work_tx.try_send(spec);
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let (done_tx, done_rx) = mpsc::channel(capacity);
        let ctx = Arc::new(WorkerContext {
            transport: Arc::clone(&self.transport),
            source,
            upload_path,
            inter_chunk_delay: self.inter_chunk_delay,
            cancel: cancel.clone(),
        });

        debug!(workers, path = %ctx.upload_path, "starting chunk workers");

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let ctx = Arc::clone(&ctx);
            let work_rx = Arc::clone(&work_rx);
            let done_tx = done_tx.clone();
            set.spawn(async move {
                let result = run_worker(worker, &ctx, &work_rx, &done_tx).await;
                if let Err(e) = &result
                    && !matches!(e, UploadError::Cancelled)
                {
                    error!(worker, error = %e, "chunk worker failed, aborting upload");
                    ctx.cancel.cancel();
                }
                result
            });
        }

        ScheduledRun {
            completions: done_rx,
            workers: set,
            cancel,
        }
    }
}

/// Handle to a running set of chunk workers.
pub struct ScheduledRun {
    completions: mpsc::Receiver<ChunkDone>,
    workers: JoinSet<Result<(), UploadError>>,
    cancel: CancellationToken,
}

impl ScheduledRun {
    /// Waits for the next confirmed chunk. Returns `None` once every worker
    /// has stopped.
    pub async fn next_completion(&mut self) -> Option<ChunkDone> {
        self.completions.recv().await
    }

    /// Waits for every worker and returns the originating error, if any.
    ///
    /// A chunk failure wins over the `Cancelled` results of the workers it
    /// stopped; `Cancelled` is returned only when nothing else failed.
    pub async fn finish(mut self) -> Result<(), UploadError> {
        let mut first_error = None;
        let mut cancelled = false;

        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(UploadError::Cancelled)) => cancelled = true,
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    self.cancel.cancel();
                    first_error.get_or_insert(UploadError::Join(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if cancelled => Err(UploadError::Cancelled),
            None => Ok(()),
        }
    }
}

async fn run_worker(
    worker: usize,
    ctx: &WorkerContext,
    work_rx: &Mutex<mpsc::Receiver<ChunkSpec>>,
    done_tx: &mpsc::Sender<ChunkDone>,
) -> Result<(), UploadError> {
    let mut reader = ChunkReader::open(&ctx.source).await?;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let next = work_rx.lock().await.recv().await;
        let Some(spec) = next else {
            debug!(worker, "no chunks left");
            return Ok(());
        };

        let chunk = reader.read(spec).await?;
        let destination = chunk_path(&ctx.upload_path, spec.index);
        let attempts = ctx
            .transport
            .send(&chunk, &destination, &ctx.cancel)
            .await?;

        let _ = done_tx
            .send(ChunkDone {
                index: spec.index,
                bytes: chunk.size(),
                checksum: chunk.checksum,
                attempts,
            })
            .await;

        if !ctx.inter_chunk_delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(ctx.inter_chunk_delay) => {}
            }
        }
    }
}
