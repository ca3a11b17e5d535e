//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::{
    DEFAULT_BACKEND_ENDPOINT, DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_BACKOFF_BASE_MS,
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS,
    DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_KUBELET_ROOT_DIR, DEFAULT_MAX_RETRIES,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKER_THREADS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// CSI driver this instance is responsible for
    /// Volumes backed by any other driver are ignored
    pub driver_name: String,
    /// Number of concurrent reconcile workers
    pub worker_threads: usize,
    /// Interval between full volume resyncs (seconds)
    pub resync_interval_secs: u64,
    /// Run the periodic resync loop
    pub enable_resync: bool,
    /// Rate-limited retries before a volume is dropped until its next trigger
    pub max_retries: u32,
    /// Per-item backoff starting value (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-item backoff cap (seconds)
    pub backoff_max_secs: u64,
    /// How long `run` waits for the object caches before giving up (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Poll interval while waiting for cache sync (milliseconds)
    pub cache_sync_poll_interval_ms: u64,
    /// Storage backend endpoint for health queries
    pub backend_endpoint: String,
    /// Timeout for a single backend health query (seconds)
    pub backend_timeout_secs: u64,
    /// Kubelet root directory (node-side volume paths)
    pub kubelet_root_dir: PathBuf,
    /// Also report abnormal volumes on the pods mounting them
    pub report_pod_events: bool,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            driver_name: String::new(),
            worker_threads: DEFAULT_WORKER_THREADS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            enable_resync: true,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            cache_sync_poll_interval_ms: DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS,
            backend_endpoint: DEFAULT_BACKEND_ENDPOINT.to_string(),
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            kubelet_root_dir: PathBuf::from(DEFAULT_KUBELET_ROOT_DIR),
            report_pod_events: true,
            log_level: "INFO".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            driver_name: env_var_or_default_str("DRIVER_NAME", ""),
            worker_threads: env_var_or_default("WORKER_THREADS", DEFAULT_WORKER_THREADS),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            enable_resync: env_var_or_default_bool("ENABLE_RESYNC", true),
            max_retries: env_var_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            cache_sync_timeout_secs: env_var_or_default(
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            cache_sync_poll_interval_ms: env_var_or_default(
                "CACHE_SYNC_POLL_INTERVAL_MS",
                DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS,
            ),
            backend_endpoint: env_var_or_default_str("BACKEND_ENDPOINT", DEFAULT_BACKEND_ENDPOINT),
            backend_timeout_secs: env_var_or_default(
                "BACKEND_TIMEOUT_SECS",
                DEFAULT_BACKEND_TIMEOUT_SECS,
            ),
            kubelet_root_dir: PathBuf::from(env_var_or_default_str(
                "KUBELET_ROOT_DIR",
                DEFAULT_KUBELET_ROOT_DIR,
            )),
            report_pod_events: env_var_or_default_bool("REPORT_POD_EVENTS", true),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
        }
    }

    /// Get resync interval duration
    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get backoff max duration
    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    #[must_use]
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    #[must_use]
    pub fn cache_sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sync_poll_interval_ms)
    }

    #[must_use]
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}
