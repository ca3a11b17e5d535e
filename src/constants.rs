//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKER_THREADS: usize = 10;

/// Default interval between full volume resyncs (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;

/// Shortest resync interval used when the configured one is zero
pub const MIN_RESYNC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Default number of rate-limited retries before a volume is dropped from the queue
pub const DEFAULT_MAX_RETRIES: u32 = 15;

/// Default per-item backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Default per-item backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Default time allowed for the object caches to complete their initial list (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 300;

/// Default poll interval while waiting for cache sync (milliseconds)
pub const DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS: u64 = 100;

/// Default storage backend endpoint
pub const DEFAULT_BACKEND_ENDPOINT: &str = "http://127.0.0.1:9808";

/// Default timeout for a single backend health query (seconds)
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 15;

/// Default kubelet root directory, used to derive node-side volume paths
pub const DEFAULT_KUBELET_ROOT_DIR: &str = "/var/lib/kubelet";

/// Name of the work queue feeding the reconcile workers
pub const VOLUME_QUEUE_NAME: &str = "csi-monitor-pv-queue";

/// Event reason attached to volumes (and their pods) reported as abnormal
pub const EVENT_REASON_VOLUME_ABNORMAL: &str = "VolumeConditionAbnormal";

/// Event action recorded with every health event
pub const EVENT_ACTION_HEALTH_CHECK: &str = "VolumeHealthCheck";
