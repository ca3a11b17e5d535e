//! # Watch Loop
//!
//! Starts the volume, claim and pod informers, builds the monitor on top of
//! them and runs it until SIGTERM/SIGINT.

use super::InitializationResult;
use crate::backend::HttpHealthClient;
use crate::cache::{spawn_informer, InformerCache, ObjectCache};
use crate::config::ControllerConfig;
use crate::controller::{MonitorCaches, VolumeHealthMonitor};
use crate::events::KubeEventRecorder;
use anyhow::{bail, Context, Result};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use kube::Api;
use kube_runtime::watcher;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Run the monitor until a shutdown signal arrives
///
/// # Errors
///
/// Returns an error if no driver name is configured, the backend client cannot
/// be built, or the caches fail to sync.
pub async fn run_monitor(init: InitializationResult, config: ControllerConfig) -> Result<()> {
    if config.driver_name.is_empty() {
        bail!("No CSI driver configured; set DRIVER_NAME or --driver-name");
    }

    let client = init.client;
    let volumes = Arc::new(InformerCache::<PersistentVolume>::new("PersistentVolume"));
    let claims = Arc::new(InformerCache::<PersistentVolumeClaim>::new(
        "PersistentVolumeClaim",
    ));
    let pods = Arc::new(InformerCache::<Pod>::new("Pod"));

    let backend = HttpHealthClient::new(&config.backend_endpoint, config.backend_timeout())
        .context("Failed to create backend health client")?;
    let events = KubeEventRecorder::new(client.clone(), &config.driver_name);

    let monitor = VolumeHealthMonitor::new(
        config.clone(),
        MonitorCaches {
            volumes: Arc::clone(&volumes) as Arc<dyn ObjectCache<PersistentVolume>>,
            claims: Arc::clone(&claims) as Arc<dyn ObjectCache<PersistentVolumeClaim>>,
            pods: Arc::clone(&pods) as Arc<dyn ObjectCache<Pod>>,
        },
        Arc::new(backend),
        Arc::new(events),
    )
    .with_readiness(Arc::clone(&init.server_state.is_ready));

    // Handlers are registered by now, so the initial list reaches them
    let informers = [
        spawn_informer(Api::all(client.clone()), volumes, watcher::Config::default()),
        spawn_informer(Api::all(client.clone()), claims, watcher::Config::default()),
        spawn_informer(Api::all(client), pods, watcher::Config::default()),
    ];

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        let _ = stop_tx.send(true);
    });

    let result = monitor.run(config.worker_threads, stop_rx).await;

    for informer in informers {
        informer.abort();
    }
    result.context("Volume health monitor failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
