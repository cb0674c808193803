//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunklift_reassembler::ReassemblerConfig;
use chunklift_registry::QueueConfig;
use serde::{Deserialize, Serialize};

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "CHUNKLIFT_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "chunklift.json";

/// Settings read from `chunklift.json`. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory backing the object store.
    pub storage_root: PathBuf,
    /// JSON file holding jobs and queue items.
    pub registry_path: PathBuf,
    pub workers: usize,
    pub poll_interval_ms: u64,
    /// How long a claim survives without merge progress.
    pub lease_secs: u64,
    pub max_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data/objects"),
            registry_path: PathBuf::from("data/registry.json"),
            workers: 2,
            poll_interval_ms: 2000,
            lease_secs: 600,
            max_attempts: 3,
        }
    }
}

impl ServiceConfig {
    /// Loads the config from `$CHUNKLIFT_CONFIG` or `./chunklift.json`.
    ///
    /// A missing or unparsable file yields the defaults with a warning.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ServiceConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_attempts: self.max_attempts.max(1),
            lease_duration: Duration::from_secs(self.lease_secs),
        }
    }

    pub fn reassembler_config(&self) -> ReassemblerConfig {
        ReassemblerConfig::default()
            .with_workers(self.workers.max(1))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_lease_renewal(Duration::from_secs((self.lease_secs / 4).max(1)))
    }
}
