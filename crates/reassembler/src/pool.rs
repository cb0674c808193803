//! Polling pool of reassembly workers.

use std::sync::Arc;

use chunklift_registry::{JobRegistry, ProcessingQueue};
use chunklift_storage::ObjectStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReassemblerConfig;
use crate::worker::{ProcessOutcome, Reassembler};

/// Runs `workers` independent [`Reassembler`] loops against one queue.
///
/// Each loop claims items until the queue is empty, then sleeps for
/// `poll_interval`. Different items are merged concurrently; the queue's
/// exclusive claims keep any single item on one worker.
pub struct ReassemblerPool {
    store: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobRegistry>,
    queue: Arc<dyn ProcessingQueue>,
    config: ReassemblerConfig,
    name: String,
}

impl ReassemblerPool {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobRegistry>,
        queue: Arc<dyn ProcessingQueue>,
        config: ReassemblerConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            queue,
            config,
            name: "reassembler".into(),
        }
    }

    /// Prefix for worker ids, which appear in queue claims and logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs until `cancel` is cancelled. A worker finishes the item it is
    /// merging before it stops.
    pub async fn run(self, cancel: CancellationToken) {
        let workers = self.config.workers.max(1);
        info!(workers, poll_ms = self.config.poll_interval.as_millis() as u64, "reassembler pool started");

        let mut set = JoinSet::new();
        for n in 0..workers {
            let worker = Reassembler::new(
                Arc::clone(&self.store),
                Arc::clone(&self.jobs),
                Arc::clone(&self.queue),
                format!("{}-{n}", self.name),
            )
            .with_buffer_size(self.config.buffer_size)
            .with_lease_renewal(self.config.lease_renewal);
            let poll_interval = self.config.poll_interval;
            let cancel = cancel.clone();
            set.spawn(async move { run_worker(worker, poll_interval, cancel).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "reassembler worker panicked");
            }
        }
        info!("reassembler pool stopped");
    }
}

async fn run_worker(
    worker: Reassembler,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
) {
    debug!(worker = %worker.worker_id(), "worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match worker.process_next().await {
            // Keep draining while there is work.
            Ok(Some(ProcessOutcome::Completed { .. })) => continue,
            Ok(Some(ProcessOutcome::Failed { .. })) | Ok(None) => {}
            Err(e) => warn!(worker = %worker.worker_id(), error = %e, "failed to claim queue item"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(worker = %worker.worker_id(), "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{FlakyStore, sample_data, stage_upload};
    use chunklift_protocol::{JobStatus, QueueStatus};
    use chunklift_registry::MemoryRegistry;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_processes_every_item_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::new(dir.path()));
        let registry = Arc::new(MemoryRegistry::default());

        let mut uploads = Vec::new();
        for n in 0..6 {
            let path = format!("owner-1/{n}_clip.mp4");
            let data = sample_data(300 + n * 17);
            stage_upload(store.as_ref(), &registry, &path, &data, 64).await;
            uploads.push((path, data));
        }

        let pool = ReassemblerPool::new(
            store.clone(),
            registry.clone(),
            registry.clone(),
            ReassemblerConfig::default()
                .with_workers(3)
                .with_poll_interval(Duration::from_millis(10)),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let done = registry
                .list_queue_items(Some(QueueStatus::Completed))
                .await
                .unwrap()
                .len();
            if done == uploads.len() || tokio::time::Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        for (path, data) in &uploads {
            assert_eq!(&store.get_object(path).await.unwrap(), data);
        }
        for item in registry.list_queue_items(None).await.unwrap() {
            assert_eq!(item.status, QueueStatus::Completed);
            assert_eq!(item.attempts, 0);
        }
        for job in registry.list_jobs(None).await.unwrap() {
            assert_eq!(job.status, JobStatus::Completed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_pool_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(MemoryRegistry::default());
        let pool = ReassemblerPool::new(
            Arc::new(FlakyStore::new(dir.path())),
            registry.clone(),
            registry,
            ReassemblerConfig::default().with_workers(2),
        )
        .with_name("test");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pool.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
