//! In-process registry with optional JSON-file persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use chunklift_protocol::{
    JobStatus, ProcessingQueueItem, QueueStatus, UploadJob, UploadMetadata,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::traits::{
    FailureOutcome, JobRegistry, NewJob, ProcessingQueue, QueueConfig, RegistryFuture,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    #[serde(default)]
    jobs: BTreeMap<String, UploadJob>,
    #[serde(default)]
    queue: BTreeMap<String, ProcessingQueueItem>,
}

/// Job registry and processing queue held in memory.
///
/// Every operation runs under one mutex, which is what makes
/// [`claim_queue_item`](ProcessingQueue::claim_queue_item) an exclusive
/// check-and-set. When opened with a path, every mutation is written to a
/// JSON file (temp file + rename) and reloaded on the next open.
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
    path: Option<PathBuf>,
    config: QueueConfig,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl MemoryRegistry {
    /// Creates a registry that lives only in memory.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            path: None,
            config,
        }
    }

    /// Opens a registry persisted at `path`, loading existing records.
    pub fn open(path: impl Into<PathBuf>, config: QueueConfig) -> Result<Self, RegistryError> {
        let path = path.into();
        let state = load_state(&path)?;
        info!(
            path = %path.display(),
            jobs = state.jobs.len(),
            queue_items = state.queue.len(),
            "registry opened"
        );
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            config,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        now + lease
    }

    /// Writes the current state to disk if the registry is file-backed.
    fn persist(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    fn insert_job(&self, job: NewJob) -> Result<String, RegistryError> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let record = UploadJob {
            id: id.clone(),
            owner_id: job.owner_id,
            file_name: job.file_name,
            file_size: job.file_size,
            upload_path: job.upload_path,
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.lock();
        state.jobs.insert(id.clone(), record);
        self.persist(&state)?;
        debug!(job = %id, "job created");
        Ok(id)
    }

    fn set_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;

        if !apply_job_status(job, status, error) {
            debug!(job = %job_id, current = ?job.status, requested = ?status, "job status update ignored");
            return Ok(());
        }
        debug!(job = %job_id, status = ?status, "job status updated");
        self.persist(&state)
    }

    fn find_job(&self, job_id: &str) -> Option<UploadJob> {
        self.lock().jobs.get(job_id).cloned()
    }

    fn jobs(&self, status: Option<JobStatus>) -> Vec<UploadJob> {
        let state = self.lock();
        let mut jobs: Vec<UploadJob> = state
            .jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        jobs
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    fn enqueue(
        &self,
        job_id: &str,
        upload_path: &str,
        total_chunks: u32,
        metadata: UploadMetadata,
    ) -> Result<String, RegistryError> {
        let mut state = self.lock();
        if !state.jobs.contains_key(job_id) {
            return Err(RegistryError::JobNotFound(job_id.to_string()));
        }

        let max_attempts = self.config.max_attempts;
        if let Some(existing) = state.queue.values().find(|i| {
            i.job_id == job_id && (i.status != QueueStatus::Failed || i.attempts < max_attempts)
        }) {
            debug!(job = %job_id, item = %existing.id, "job already queued");
            return Ok(existing.id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let item = ProcessingQueueItem {
            id: id.clone(),
            job_id: job_id.to_string(),
            upload_path: upload_path.to_string(),
            total_chunks,
            metadata,
            status: QueueStatus::Queued,
            attempts: 0,
            last_attempt_at: None,
            created_at: Utc::now(),
            processed_at: None,
            error: None,
            claimed_by: None,
            lease_expires_at: None,
            merged_chunks: 0,
            merged_bytes: 0,
        };
        state.queue.insert(id.clone(), item);
        self.persist(&state)?;
        info!(job = %job_id, item = %id, total_chunks, "job queued for reassembly");
        Ok(id)
    }

    fn claim(&self, worker_id: &str) -> Result<Option<ProcessingQueueItem>, RegistryError> {
        let now = Utc::now();
        let max_attempts = self.config.max_attempts;
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut dirty = false;

        // Reclaim items whose worker stopped renewing its lease.
        let expired: Vec<String> = state
            .queue
            .values()
            .filter(|i| i.lease_expired(now))
            .map(|i| i.id.clone())
            .collect();
        for id in expired {
            let Some(item) = state.queue.get_mut(&id) else {
                continue;
            };
            let previous = item.claimed_by.take().unwrap_or_default();
            item.attempts += 1;
            item.status = QueueStatus::Failed;
            item.lease_expires_at = None;
            item.error = Some(format!("lease held by {previous} expired"));
            warn!(item = %id, worker = %previous, attempts = item.attempts, "queue item lease expired");

            if item.attempts >= max_attempts {
                let job_id = item.job_id.clone();
                let error = item.error.clone();
                if let Some(job) = state.jobs.get_mut(&job_id) {
                    apply_job_status(job, JobStatus::Failed, error);
                }
            }
            dirty = true;
        }

        let next = state
            .queue
            .values()
            .filter(|i| match i.status {
                QueueStatus::Queued => true,
                QueueStatus::Failed => i.attempts < max_attempts,
                QueueStatus::Processing | QueueStatus::Completed => false,
            })
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .map(|i| i.id.clone());

        let claimed = match next {
            Some(id) => {
                let lease_until = self.lease_until(now);
                state.queue.get_mut(&id).map(|item| {
                    item.status = QueueStatus::Processing;
                    item.claimed_by = Some(worker_id.to_string());
                    item.last_attempt_at = Some(now);
                    item.lease_expires_at = Some(lease_until);
                    item.clone()
                })
            }
            None => None,
        };

        if claimed.is_some() || dirty {
            self.persist(state)?;
        }
        if let Some(item) = &claimed {
            debug!(item = %item.id, worker = %worker_id, attempts = item.attempts, "queue item claimed");
        }
        Ok(claimed)
    }

    /// Returns the item if `worker_id` still holds its claim.
    fn owned_item<'s>(
        state: &'s mut RegistryState,
        item_id: &str,
        worker_id: &str,
    ) -> Result<&'s mut ProcessingQueueItem, RegistryError> {
        let item = state
            .queue
            .get_mut(item_id)
            .ok_or_else(|| RegistryError::ItemNotFound(item_id.to_string()))?;
        if item.status != QueueStatus::Processing || item.claimed_by.as_deref() != Some(worker_id)
        {
            return Err(RegistryError::LeaseLost {
                item_id: item_id.to_string(),
                worker_id: worker_id.to_string(),
            });
        }
        Ok(item)
    }

    fn merge_progress(
        &self,
        item_id: &str,
        worker_id: &str,
        merged_chunks: u32,
        merged_bytes: u64,
    ) -> Result<(), RegistryError> {
        let lease_until = self.lease_until(Utc::now());
        let mut state = self.lock();
        let item = Self::owned_item(&mut state, item_id, worker_id)?;
        item.merged_chunks = merged_chunks;
        item.merged_bytes = merged_bytes;
        item.lease_expires_at = Some(lease_until);
        self.persist(&state)
    }

    fn renew(&self, item_id: &str, worker_id: &str) -> Result<(), RegistryError> {
        let lease_until = self.lease_until(Utc::now());
        let mut state = self.lock();
        let item = Self::owned_item(&mut state, item_id, worker_id)?;
        item.lease_expires_at = Some(lease_until);
        self.persist(&state)
    }

    fn complete(&self, item_id: &str, worker_id: &str) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let item = Self::owned_item(&mut state, item_id, worker_id)?;
        item.status = QueueStatus::Completed;
        item.processed_at = Some(Utc::now());
        item.claimed_by = None;
        item.lease_expires_at = None;
        item.error = None;
        self.persist(&state)
    }

    fn fail(
        &self,
        item_id: &str,
        worker_id: &str,
        error: String,
    ) -> Result<FailureOutcome, RegistryError> {
        let max_attempts = self.config.max_attempts;
        let mut guard = self.lock();
        let state = &mut *guard;
        let item = Self::owned_item(state, item_id, worker_id)?;
        item.attempts += 1;
        item.status = QueueStatus::Failed;
        item.claimed_by = None;
        item.lease_expires_at = None;
        item.error = Some(error.clone());

        let outcome = FailureOutcome {
            attempts: item.attempts,
            terminal: item.attempts >= max_attempts,
        };
        if outcome.terminal {
            let job_id = item.job_id.clone();
            if let Some(job) = state.jobs.get_mut(&job_id) {
                apply_job_status(job, JobStatus::Failed, Some(error));
            }
        }
        self.persist(state)?;
        Ok(outcome)
    }

    fn find_item(&self, item_id: &str) -> Option<ProcessingQueueItem> {
        self.lock().queue.get(item_id).cloned()
    }

    fn items(&self, status: Option<QueueStatus>) -> Vec<ProcessingQueueItem> {
        let state = self.lock();
        let mut items: Vec<ProcessingQueueItem> = state
            .queue
            .values()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        items
    }
}

/// Applies a forward-only status change. Returns `false` if ignored.
fn apply_job_status(job: &mut UploadJob, status: JobStatus, error: Option<String>) -> bool {
    if !job.status.can_transition_to(status) {
        return false;
    }
    job.status = status;
    if error.is_some() {
        job.error = error;
    }
    job.updated_at = Utc::now();
    true
}

/// Loads registry state from a JSON file on disk.
fn load_state(path: &Path) -> Result<RegistryState, RegistryError> {
    if !path.exists() {
        return Ok(RegistryState::default());
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

impl JobRegistry for MemoryRegistry {
    fn create_job(&self, job: NewJob) -> RegistryFuture<'_, String> {
        Box::pin(std::future::ready(self.insert_job(job)))
    }

    fn update_job_status<'a>(
        &'a self,
        job_id: &'a str,
        status: JobStatus,
        error: Option<String>,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(std::future::ready(self.set_job_status(job_id, status, error)))
    }

    fn get_job<'a>(&'a self, job_id: &'a str) -> RegistryFuture<'a, Option<UploadJob>> {
        Box::pin(std::future::ready(Ok(self.find_job(job_id))))
    }

    fn list_jobs(&self, status: Option<JobStatus>) -> RegistryFuture<'_, Vec<UploadJob>> {
        Box::pin(std::future::ready(Ok(self.jobs(status))))
    }
}

impl ProcessingQueue for MemoryRegistry {
    fn enqueue_processing<'a>(
        &'a self,
        job_id: &'a str,
        upload_path: &'a str,
        total_chunks: u32,
        metadata: UploadMetadata,
    ) -> RegistryFuture<'a, String> {
        Box::pin(std::future::ready(self.enqueue(
            job_id,
            upload_path,
            total_chunks,
            metadata,
        )))
    }

    fn claim_queue_item<'a>(
        &'a self,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>> {
        Box::pin(std::future::ready(self.claim(worker_id)))
    }

    fn record_merge_progress<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        merged_chunks: u32,
        merged_bytes: u64,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(std::future::ready(self.merge_progress(
            item_id,
            worker_id,
            merged_chunks,
            merged_bytes,
        )))
    }

    fn renew_lease<'a>(&'a self, item_id: &'a str, worker_id: &'a str) -> RegistryFuture<'a, ()> {
        Box::pin(std::future::ready(self.renew(item_id, worker_id)))
    }

    fn complete_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(std::future::ready(self.complete(item_id, worker_id)))
    }

    fn fail_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        error: String,
    ) -> RegistryFuture<'a, FailureOutcome> {
        Box::pin(std::future::ready(self.fail(item_id, worker_id, error)))
    }

    fn get_queue_item<'a>(
        &'a self,
        item_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>> {
        Box::pin(std::future::ready(Ok(self.find_item(item_id))))
    }

    fn list_queue_items(
        &self,
        status: Option<QueueStatus>,
    ) -> RegistryFuture<'_, Vec<ProcessingQueueItem>> {
        Box::pin(std::future::ready(Ok(self.items(status))))
    }
}
