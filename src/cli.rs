//! # Command Line
//!
//! Flags for the `volume-health-monitor` binary. Every flag is optional and
//! overrides the matching environment variable.
//!
//! ## Usage
//!
//! ```bash
//! volume-health-monitor --driver-name hostpath.csi.k8s.io --workers 4
//! volume-health-monitor --driver-name ebs.csi.aws.com --enable-resync false
//! ```

use crate::config::{ControllerConfig, ServerConfig};
use clap::{ArgAction, Parser};

/// Kubernetes volume health monitor for CSI drivers
#[derive(Debug, Default, Parser)]
#[command(name = "volume-health-monitor", version, about, long_about = None)]
pub struct Cli {
    /// CSI driver whose volumes are monitored (overrides DRIVER_NAME)
    #[arg(long)]
    pub driver_name: Option<String>,

    /// Number of concurrent check workers (overrides WORKER_THREADS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds between full volume resyncs (overrides RESYNC_INTERVAL_SECS)
    #[arg(long)]
    pub resync_interval_secs: Option<u64>,

    /// Enable or disable the periodic resync (overrides ENABLE_RESYNC)
    #[arg(long, action = ArgAction::Set)]
    pub enable_resync: Option<bool>,

    /// Storage backend endpoint (overrides BACKEND_ENDPOINT)
    #[arg(long)]
    pub backend_endpoint: Option<String>,

    /// Port for metrics and probes (overrides METRICS_PORT)
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Cli {
    /// Apply the flags that were given on top of the loaded configuration
    pub fn apply(&self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(driver_name) = &self.driver_name {
            controller.driver_name.clone_from(driver_name);
        }
        if let Some(workers) = self.workers {
            controller.worker_threads = workers;
        }
        if let Some(secs) = self.resync_interval_secs {
            controller.resync_interval_secs = secs;
        }
        if let Some(enable) = self.enable_resync {
            controller.enable_resync = enable;
        }
        if let Some(endpoint) = &self.backend_endpoint {
            controller.backend_endpoint.clone_from(endpoint);
        }
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
    }
}
