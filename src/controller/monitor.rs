//! # Volume Health Monitor
//!
//! Wires the caches, the claim index, the work queue and the checker together
//! and owns the startup/shutdown sequence:
//!
//! 1. Event handlers are registered at construction, so notifications start
//!    filling the index and the queue right away.
//! 2. `run` waits until the volume, claim and pod caches have all synced.
//!    Workers never start against a partial view; failing to sync is fatal.
//! 3. Workers and the optional periodic resync start, readiness is reported.
//! 4. On stop the queue is shut down, waiting workers exit and in-flight
//!    checks are allowed to finish.

use super::backoff::ExponentialBackoff;
use super::checker::VolumeChecker;
use super::handlers::{pod_handler, volume_handler};
use super::index::VolumeIndex;
use super::workqueue::WorkQueue;
use crate::backend::VolumeHealthClient;
use crate::cache::{CacheError, ObjectCache};
use crate::config::ControllerConfig;
use crate::constants::{MIN_RESYNC_INTERVAL, VOLUME_QUEUE_NAME};
use crate::events::EventSink;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("caches did not sync: {0}")]
    CacheSync(String),
}

/// Object caches consumed by the monitor
#[derive(Clone)]
pub struct MonitorCaches {
    pub volumes: Arc<dyn ObjectCache<PersistentVolume>>,
    pub claims: Arc<dyn ObjectCache<PersistentVolumeClaim>>,
    pub pods: Arc<dyn ObjectCache<Pod>>,
}

impl std::fmt::Debug for MonitorCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCaches")
            .field("volumes", &self.volumes.has_synced())
            .field("claims", &self.claims.has_synced())
            .field("pods", &self.pods.has_synced())
            .finish()
    }
}

impl MonitorCaches {
    /// Kinds that have not completed their initial sync
    fn unsynced(&self) -> Vec<&'static str> {
        [
            (self.volumes.kind(), self.volumes.has_synced()),
            (self.claims.kind(), self.claims.has_synced()),
            (self.pods.kind(), self.pods.has_synced()),
        ]
        .into_iter()
        .filter_map(|(kind, synced)| (!synced).then_some(kind))
        .collect()
    }
}

/// State shared by the workers, the resync loop and the facade
#[derive(Debug)]
pub(crate) struct MonitorContext {
    pub(crate) config: ControllerConfig,
    pub(crate) caches: MonitorCaches,
    pub(crate) index: Arc<VolumeIndex>,
    pub(crate) queue: WorkQueue<String>,
    pub(crate) checker: VolumeChecker,
}

/// Volume health reconciliation engine
#[derive(Debug)]
pub struct VolumeHealthMonitor {
    ctx: Arc<MonitorContext>,
    ready: Option<Arc<AtomicBool>>,
}

impl VolumeHealthMonitor {
    /// Build the monitor and register its handlers on the caches
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        caches: MonitorCaches,
        client: Arc<dyn VolumeHealthClient>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let index = Arc::new(VolumeIndex::new());
        let queue = WorkQueue::new(
            VOLUME_QUEUE_NAME,
            ExponentialBackoff::new(config.backoff_base(), config.backoff_max()),
        );
        let checker = VolumeChecker::new(
            client,
            events,
            Arc::clone(&caches.claims),
            Arc::clone(&index),
            &config,
        );

        caches.volumes.add_event_handler(volume_handler(
            Arc::from(config.driver_name.as_str()),
            queue.clone(),
            Arc::clone(&index),
        ));
        caches.pods.add_event_handler(pod_handler(Arc::clone(&index)));

        Self {
            ctx: Arc::new(MonitorContext {
                config,
                caches,
                index,
                queue,
                checker,
            }),
            ready: None,
        }
    }

    /// Flag set once workers are running and cleared on shutdown
    #[must_use]
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = Some(ready);
        self
    }

    #[must_use]
    pub fn index(&self) -> &VolumeIndex {
        &self.ctx.index
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue<String> {
        &self.ctx.queue
    }

    #[must_use]
    pub fn checker(&self) -> &VolumeChecker {
        &self.ctx.checker
    }

    /// Enqueue every cached volume owned by this driver that is not already pending
    ///
    /// Returns the number of volumes newly queued.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the volume cache cannot be listed.
    pub fn resync_volumes(&self) -> Result<usize, CacheError> {
        self.ctx.resync_volumes()
    }

    /// Run one worker iteration
    ///
    /// Returns `false` once the queue has been shut down.
    pub async fn process_next_item(&self) -> bool {
        self.ctx.process_next_item().await
    }

    /// Close the queue; waiting workers return
    pub fn shut_down(&self) {
        self.ctx.queue.shut_down();
    }

    /// Run until `stop` flips to `true`
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::CacheSync`] if the caches do not sync within the
    /// configured timeout or `stop` fires first. No worker is started in that case.
    pub async fn run(&self, workers: usize, mut stop: watch::Receiver<bool>) -> Result<(), MonitorError> {
        info!(
            driver = %self.ctx.config.driver_name,
            workers,
            "Starting volume health monitor"
        );

        if let Err(e) = self.wait_for_cache_sync(&mut stop).await {
            error!(error = %e, "Cannot sync caches");
            self.ctx.queue.shut_down();
            return Err(e);
        }

        let workers = if workers == 0 {
            warn!("Worker count is 0, starting a single worker");
            1
        } else {
            workers
        };

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let ctx = Arc::clone(&self.ctx);
            tasks.spawn(async move { while ctx.process_next_item().await {} });
        }

        if self.ctx.config.enable_resync {
            let ctx = Arc::clone(&self.ctx);
            let mut interval = self.ctx.config.resync_interval();
            if interval.is_zero() {
                warn!("Resync interval is 0, resyncing every {MIN_RESYNC_INTERVAL:?}");
                interval = MIN_RESYNC_INTERVAL;
            }
            let stop = stop.clone();
            tasks.spawn(async move { ctx.resync_loop(interval, stop).await });
        }

        self.set_ready(true);
        info!("Volume health monitor started");

        // A dropped sender counts as a stop
        let _ = stop.wait_for(|stopped| *stopped).await;

        info!("Shutting down volume health monitor");
        self.set_ready(false);
        self.ctx.queue.shut_down();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Monitor task failed");
            }
        }
        info!("Volume health monitor stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(&self, stop: &mut watch::Receiver<bool>) -> Result<(), MonitorError> {
        let timeout = self.ctx.config.cache_sync_timeout();
        let poll_interval = self.ctx.config.cache_sync_poll_interval();
        let caches = &self.ctx.caches;

        let synced = async {
            loop {
                if caches.unsynced().is_empty() {
                    return;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::select! {
            result = tokio::time::timeout(timeout, synced) => match result {
                Ok(()) => {
                    info!("Caches synced");
                    Ok(())
                }
                Err(_) => Err(MonitorError::CacheSync(format!(
                    "timed out after {timeout:?} waiting for {}",
                    caches.unsynced().join(", ")
                ))),
            },
            _ = stop.wait_for(|stopped| *stopped) => Err(MonitorError::CacheSync(
                "stopped before caches synced".to_string(),
            )),
        }
    }

    fn set_ready(&self, ready: bool) {
        if let Some(flag) = &self.ready {
            flag.store(ready, Ordering::Release);
        }
    }
}
