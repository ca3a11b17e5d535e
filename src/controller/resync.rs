//! # Periodic Resync
//!
//! Backstop against missed notifications and against volumes that degrade
//! without any change to their cluster objects: every interval, every cached
//! volume owned by this driver that is not already pending is enqueued.

use super::handlers::{enqueue_volume, is_managed_volume, Enqueue};
use super::monitor::MonitorContext;
use crate::cache::CacheError;
use crate::observability::metrics;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

impl MonitorContext {
    pub(crate) fn resync_volumes(&self) -> Result<usize, CacheError> {
        let volumes = self.caches.volumes.list()?;
        let mut enqueued = 0;
        for pv in volumes
            .iter()
            .filter(|pv| is_managed_volume(pv, &self.config.driver_name))
        {
            if enqueue_volume(&self.queue, &self.index, &pv.name_any()) == Enqueue::Queued {
                enqueued += 1;
            }
        }
        metrics::increment_resync_enqueued(enqueued);
        debug!(listed = volumes.len(), enqueued, "volume resync finished");
        Ok(enqueued)
    }

    /// Resync every `interval` until `stop` fires; the first pass runs immediately
    pub(crate) async fn resync_loop(self: Arc<Self>, interval: Duration, mut stop: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Starting periodic volume resync");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.resync_volumes() {
                    Ok(_) => metrics::increment_resync_runs("success"),
                    Err(e) => {
                        metrics::increment_resync_runs("error");
                        error!(error = %e, "Failed to resync volumes, skipping cycle");
                    }
                },
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }
        debug!("Periodic volume resync stopped");
    }
}
