//! Chunklift reassembly service entry point.

mod config;

use std::sync::Arc;

use anyhow::Context;
use chunklift_reassembler::ReassemblerPool;
use chunklift_registry::MemoryRegistry;
use chunklift_storage::FsObjectStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting chunklift reassembler"
    );

    let config = config::ServiceConfig::load()?;
    tracing::info!(
        storage = %config.storage_root.display(),
        registry = %config.registry_path.display(),
        workers = config.workers,
        "configuration loaded"
    );

    std::fs::create_dir_all(&config.storage_root).with_context(|| {
        format!(
            "failed to create storage root {}",
            config.storage_root.display()
        )
    })?;
    let store = Arc::new(FsObjectStore::new(&config.storage_root));
    let registry = Arc::new(
        MemoryRegistry::open(&config.registry_path, config.queue_config()).with_context(|| {
            format!("failed to open registry {}", config.registry_path.display())
        })?,
    );

    let pool = ReassemblerPool::new(
        store,
        registry.clone(),
        registry,
        config.reassembler_config(),
    );

    let cancel = CancellationToken::new();
    let pool_handle = tokio::spawn(pool.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested, waiting for workers");
    cancel.cancel();
    pool_handle.await.context("reassembler pool task failed")?;

    tracing::info!("chunklift reassembler stopped");
    Ok(())
}
