//! # Reconcile Worker
//!
//! One iteration of the worker loop: take a volume off the queue, check it,
//! and resolve the queue entry.
//!
//! - volume gone from the cache: done, no retry
//! - check succeeded (any outcome): forget the failure count, done
//! - retryable backend error: re-add rate limited until `max_retries`, then drop
//! - permanent backend error: drop
//!
//! The pending flag is cleared when the entry is resolved; it stays set while
//! a retry waits out its backoff.

use super::checker::CheckOutcome;
use super::handlers::is_managed_volume;
use super::monitor::MonitorContext;
use crate::backend::BackendError;
use crate::observability::metrics;
use std::time::Instant;
use tracing::{debug, error, warn};

impl MonitorContext {
    pub(crate) async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let started = Instant::now();
        let result = self.sync_volume(&key).await;
        metrics::observe_check_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                debug!(volume = %key, outcome = outcome.as_str(), "volume check finished");
                metrics::increment_checks(outcome.as_str());
                self.queue.forget(&key);
                self.finish(&key);
            }
            Err(e) => {
                metrics::increment_checks("error");
                metrics::increment_check_errors();
                self.handle_error(&key, &e);
            }
        }
        true
    }

    async fn sync_volume(&self, key: &str) -> Result<CheckOutcome, BackendError> {
        let Some(pv) = self.caches.volumes.get(key) else {
            debug!(volume = %key, "volume no longer exists, skipping check");
            return Ok(CheckOutcome::Missing);
        };
        if !is_managed_volume(&pv, &self.config.driver_name) {
            return Ok(CheckOutcome::Skipped);
        }
        self.checker.check_controller_volume(&pv).await
    }

    fn handle_error(&self, key: &str, error: &BackendError) {
        let attempt = self.queue.num_requeues(key);
        if error.is_retryable() && attempt < self.config.max_retries {
            warn!(volume = %key, attempt, error = %error, "volume check failed, retrying");
            metrics::increment_requeues();
            // A re-add deferred while in flight already covers the retry
            self.index.with_pending(|_| {
                if !self.queue.done(key) {
                    self.queue.add_rate_limited(key.to_string());
                }
            });
            return;
        }

        if error.is_retryable() {
            error!(volume = %key, attempt, error = %error, "volume check failed, giving up");
        } else {
            error!(volume = %key, error = %error, "volume check failed permanently");
        }
        metrics::increment_dropped();
        self.queue.forget(key);
        self.finish(key);
    }

    /// Resolve the queue entry and clear the pending flag
    ///
    /// If the volume was re-added while in flight it goes straight back on the
    /// queue and stays pending.
    fn finish(&self, key: &str) {
        self.index.with_pending(|pending| {
            if !self.queue.done(key) {
                pending.remove(key);
            }
        });
    }
}
