//! Upload entry point.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chunklift_protocol::{JobStatus, ProgressSnapshot, UploadMetadata};
use chunklift_registry::{JobRegistry, NewJob, ProcessingQueue};
use chunklift_storage::ObjectStore;
use chunklift_transfer::{ChunkSpec, ProgressTracker, plan, validate_upload_path};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UploadConfig;
use crate::content_type::detect_content_type;
use crate::error::{UploadError, ValidationError};
use crate::scheduler::UploadScheduler;
use crate::transport::ChunkTransport;
use crate::types::UploadEvent;

type SharedCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// A validated upload, ready to be registered.
struct PreparedUpload {
    file_name: String,
    file_size: u64,
    upload_path: String,
    chunks: Vec<ChunkSpec>,
}

/// Uploads local files for one owner.
///
/// Only one upload per `Uploader` is active at a time: starting a new upload
/// cancels the previous one, whose chunks stop transferring and whose job
/// and progress state are no longer written.
pub struct Uploader {
    jobs: Arc<dyn JobRegistry>,
    queue: Arc<dyn ProcessingQueue>,
    scheduler: UploadScheduler,
    owner_id: String,
    config: UploadConfig,
    active: Mutex<Option<CancellationToken>>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    progress_callback: Option<SharedCallback>,
}

impl Uploader {
    /// Creates an uploader that stores chunks in `store` and records jobs in
    /// `jobs` and `queue`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobRegistry>,
        queue: Arc<dyn ProcessingQueue>,
        owner_id: impl Into<String>,
        config: UploadConfig,
    ) -> Self {
        let transport = ChunkTransport::new(store, config.retry_policy(), config.upload_timeout);
        let scheduler = UploadScheduler::new(Arc::new(transport), config.max_concurrent_uploads)
            .with_inter_chunk_delay(config.inter_chunk_delay);
        let (events_tx, events_rx) = mpsc::channel(256);

        Self {
            jobs,
            queue,
            scheduler,
            owner_id: owner_id.into(),
            config,
            active: Mutex::new(None),
            events_tx,
            events_rx: Some(events_rx),
            progress_callback: None,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Registers a callback invoked with every progress snapshot.
    pub fn on_progress(&mut self, callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) {
        self.progress_callback = Some(Arc::new(callback));
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Cancels the in-flight upload, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.lock_active().take() {
            token.cancel();
        }
    }

    /// Uploads the file at `path` and returns the job id.
    ///
    /// On success every chunk is stored and the job is queued for reassembly.
    /// On a terminal chunk failure the job is marked `failed` and nothing is
    /// queued. A cancelled upload returns [`UploadError::Cancelled`] without
    /// touching its job again.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<String, UploadError> {
        let path = path.as_ref();
        let cancel = self.begin();

        let prepared = self.prepare(path).await?;
        let job_id = self
            .jobs
            .create_job(NewJob {
                file_name: prepared.file_name.clone(),
                file_size: prepared.file_size,
                upload_path: prepared.upload_path.clone(),
                owner_id: self.owner_id.clone(),
            })
            .await?;

        info!(
            job = %job_id,
            file = %prepared.file_name,
            bytes = prepared.file_size,
            chunks = prepared.chunks.len(),
            "upload started"
        );

        let mut tracker =
            ProgressTracker::new(prepared.file_size, prepared.chunks.len() as u32);
        if let Some(cb) = &self.progress_callback {
            let cb = Arc::clone(cb);
            let token = cancel.clone();
            tracker.on_progress(Box::new(move |snapshot| {
                if !token.is_cancelled() {
                    cb(snapshot);
                }
            }));
        }

        match self
            .transfer(&job_id, path, prepared, &mut tracker, &cancel)
            .await
        {
            Ok(queue_item_id) => {
                info!(job = %job_id, item = %queue_item_id, "upload queued for reassembly");
                self.emit(&cancel, UploadEvent::Progress(tracker.complete()));
                self.emit(
                    &cancel,
                    UploadEvent::Completed {
                        job_id: job_id.clone(),
                        queue_item_id,
                    },
                );
                Ok(job_id)
            }
            Err(_) if cancel.is_cancelled() => {
                info!(job = %job_id, "upload cancelled");
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                error!(job = %job_id, error = %message, "upload failed");

                if let Err(re) = self
                    .jobs
                    .update_job_status(&job_id, JobStatus::Failed, Some(message.clone()))
                    .await
                {
                    warn!(job = %job_id, error = %re, "failed to record job failure");
                }
                let snapshot = tracker.fail(&message);
                self.emit(&cancel, UploadEvent::Progress(snapshot));
                self.emit(
                    &cancel,
                    UploadEvent::Failed {
                        job_id: job_id.clone(),
                        error: message,
                    },
                );
                Err(e)
            }
        }
    }

    /// Installs a fresh cancellation token, cancelling the previous upload.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_active().replace(token.clone()) {
            debug!("cancelling previous upload");
            previous.cancel();
        }
        token
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validates the request and plans chunks before anything is registered.
    async fn prepare(&self, path: &Path) -> Result<PreparedUpload, UploadError> {
        self.config.validate()?;

        if self.owner_id.trim().is_empty() {
            return Err(ValidationError::MissingOwner.into());
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ValidationError::InvalidFileName(path.display().to_string()))?
            .to_string();
        if file_name.contains(['/', '\\']) || validate_upload_path(&file_name).is_err() {
            return Err(ValidationError::InvalidFileName(file_name).into());
        }

        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(chunklift_transfer::TransferError::from)?
            .len();
        if file_size > self.config.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size: file_size,
                max: self.config.max_file_size,
            }
            .into());
        }

        let chunks = plan(file_size, self.config.chunk_size)?;
        let upload_path = build_upload_path(&self.owner_id, &file_name);

        Ok(PreparedUpload {
            file_name,
            file_size,
            upload_path,
            chunks,
        })
    }

    /// Moves the job to `processing`, transfers every chunk and enqueues the
    /// job. Returns the queue item id.
    async fn transfer(
        &self,
        job_id: &str,
        source: &Path,
        prepared: PreparedUpload,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        self.jobs
            .update_job_status(job_id, JobStatus::Processing, None)
            .await?;
        self.emit(cancel, UploadEvent::Progress(tracker.start()));

        let total_chunks = prepared.chunks.len() as u32;
        let mut checksums = vec![String::new(); prepared.chunks.len()];

        if !prepared.chunks.is_empty() {
            let mut run = self.scheduler.start(
                source.to_path_buf(),
                prepared.upload_path.clone(),
                prepared.chunks,
                cancel.child_token(),
            );
            while let Some(done) = run.next_completion().await {
                debug!(job = %job_id, chunk = done.index, attempts = done.attempts, "chunk confirmed");
                if let Some(slot) = checksums.get_mut(done.index as usize) {
                    *slot = done.checksum;
                }
                let snapshot = tracker.record_chunk(done.bytes);
                self.emit(cancel, UploadEvent::Progress(snapshot));
            }
            run.finish().await?;
        }

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let metadata = UploadMetadata {
            content_type: detect_content_type(&prepared.file_name).to_string(),
            file_name: prepared.file_name,
            file_size: prepared.file_size,
            chunk_size: self.config.chunk_size,
            chunk_checksums: checksums,
        };
        let item_id = self
            .queue
            .enqueue_processing(job_id, &prepared.upload_path, total_chunks, metadata)
            .await?;
        Ok(item_id)
    }

    /// Delivers an event unless the upload has been cancelled.
    ///
    /// Events are dropped when the receiver lags behind by a full buffer.
    fn emit(&self, cancel: &CancellationToken, event: UploadEvent) {
        if cancel.is_cancelled() {
            return;
        }
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "upload event dropped");
        }
    }
}

/// Builds the storage key of a new upload:
/// `{owner}/{timestamp_millis}_{uuid8}_{file_name}`.
pub fn build_upload_path(owner_id: &str, file_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("{owner_id}/{millis}_{}_{file_name}", &unique[..8])
}
