fn main() {
    println!("Run `cargo test -p pipeline-e2e` to execute the end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use chunklift_protocol::{JobStatus, QueueStatus};
    use chunklift_reassembler::{ProcessOutcome, Reassembler};
    use chunklift_registry::{JobRegistry, MemoryRegistry, ProcessingQueue, QueueConfig};
    use chunklift_storage::{FsObjectStore, ObjectStore};
    use chunklift_transfer::{calculate_file_checksum, chunk_path};
    use chunklift_uploader::{UploadConfig, UploadEvent, Uploader};

    struct Env {
        _dir: tempfile::TempDir,
        source_dir: PathBuf,
        storage_root: PathBuf,
        registry_path: PathBuf,
    }

    impl Env {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source_dir = dir.path().join("local");
            std::fs::create_dir_all(&source_dir).unwrap();
            Self {
                source_dir,
                storage_root: dir.path().join("objects"),
                registry_path: dir.path().join("registry.json"),
                _dir: dir,
            }
        }

        fn source(&self, name: &str, len: usize) -> PathBuf {
            let data: Vec<u8> = (0..len).map(|i| (i * 13 % 256) as u8).collect();
            let path = self.source_dir.join(name);
            std::fs::write(&path, data).unwrap();
            path
        }

        fn store(&self) -> Arc<FsObjectStore> {
            Arc::new(FsObjectStore::new(&self.storage_root))
        }

        fn registry(&self) -> Arc<MemoryRegistry> {
            Arc::new(MemoryRegistry::open(&self.registry_path, QueueConfig::default()).unwrap())
        }
    }

    fn config() -> UploadConfig {
        UploadConfig::default()
            .with_chunk_size(4096)
            .with_max_concurrent_uploads(3)
    }

    async fn published_checksum(root: &Path, upload_path: &str) -> String {
        calculate_file_checksum(&root.join(upload_path)).await.unwrap()
    }

    #[tokio::test]
    async fn upload_then_reassemble_round_trip() {
        let env = Env::new();
        let source = env.source("interview.mp4", 4096 * 5 + 123);
        let store = env.store();
        let registry = env.registry();

        let mut uploader = Uploader::new(
            store.clone(),
            registry.clone(),
            registry.clone(),
            "owner-1",
            config(),
        );
        let mut events = uploader.take_events().unwrap();
        let job_id = uploader.upload_file(&source).await.unwrap();

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if let UploadEvent::Completed { job_id: j, .. } = event {
                completed = j == job_id;
            }
        }
        assert!(completed);

        let worker = Reassembler::new(store.clone(), registry.clone(), registry.clone(), "w1");
        let outcome = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(outcome, ProcessOutcome::Completed { .. }));

        let job = registry.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            published_checksum(&env.storage_root, &job.upload_path).await,
            calculate_file_checksum(&source).await.unwrap()
        );
        for i in 0..6 {
            let chunk = chunk_path(&job.upload_path, i);
            assert!(store.head_object(&chunk).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn queue_survives_a_service_restart() {
        let env = Env::new();
        let source = env.source("podcast.mp3", 10_000);

        let job_id = {
            let registry = env.registry();
            let uploader = Uploader::new(
                env.store(),
                registry.clone(),
                registry.clone(),
                "owner-1",
                config(),
            );
            uploader.upload_file(&source).await.unwrap()
        };

        // A fresh process opens the same registry file and storage root.
        let registry = env.registry();
        let items = registry
            .list_queue_items(Some(QueueStatus::Queued))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata.content_type, "audio/mpeg");
        assert_eq!(items[0].total_chunks, 3);

        let worker = Reassembler::new(env.store(), registry.clone(), registry.clone(), "w1");
        worker.process_next().await.unwrap().unwrap();

        let reopened = env.registry();
        let job = reopened.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            published_checksum(&env.storage_root, &job.upload_path).await,
            calculate_file_checksum(&source).await.unwrap()
        );
    }

    #[tokio::test]
    async fn registry_file_uses_camel_case_records() {
        let env = Env::new();
        let source = env.source("clip.mov", 100);
        let registry = env.registry();
        let uploader = Uploader::new(env.store(), registry.clone(), registry, "owner-1", config());
        uploader.upload_file(&source).await.unwrap();

        let raw = std::fs::read_to_string(&env.registry_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let job = value["jobs"].as_object().unwrap().values().next().unwrap();
        assert_eq!(job["status"], "processing");
        assert_eq!(job["ownerId"], "owner-1");
        assert_eq!(job["fileSize"], 100);

        let item = value["queue"].as_object().unwrap().values().next().unwrap();
        assert_eq!(item["status"], "queued");
        assert_eq!(item["totalChunks"], 1);
        assert_eq!(item["attempts"], 0);
        assert_eq!(item["metadata"]["contentType"], "video/quicktime");
        assert_eq!(
            item["metadata"]["chunkChecksums"].as_array().unwrap().len(),
            1
        );
    }
}
