//! # Work Queue
//!
//! De-duplicating, rate-limited, delay-capable queue of keys pending a check.
//!
//! Every key moves through an explicit state machine:
//!
//! ```text
//!            add                get                 done
//!   (idle) -------> queued ----------> in-flight ------------> (idle)
//!                     ^                   |   \
//!                     |   add (deferred)  |    \ add_rate_limited
//!                     +---- on done <-----+     v
//!                     +------------------- backoff-wait
//!                              timer fires
//! ```
//!
//! - A key is queued at most once, however many times it is added.
//! - A key handed to a worker is in flight until `done`; adding it meanwhile
//!   marks it dirty and it is queued again only when the worker calls `done`,
//!   so no two workers ever hold the same key.
//! - `add_rate_limited` schedules a re-add after an exponential per-key delay;
//!   `forget` resets that key's failure counter.

use crate::controller::backoff::ExponentialBackoff;
use crate::observability::metrics;
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

struct QueueState<T> {
    /// Keys ready to be handed out, in FIFO order
    queue: VecDeque<T>,
    /// Keys that need processing (queued, or re-added while in flight)
    dirty: HashSet<T>,
    /// Keys currently held by a worker
    processing: HashSet<T>,
    /// Consecutive rate-limited re-adds per key
    failures: HashMap<T, u32>,
    shutting_down: bool,
}

struct Shared<T> {
    name: &'static str,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

/// Handle to a shared work queue; clones refer to the same queue
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.name)
            .field("backoff", &self.shared.backoff)
            .finish_non_exhaustive()
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    #[must_use]
    pub fn new(name: &'static str, backoff: ExponentialBackoff) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `item` as needing processing
    ///
    /// No-op if it is already queued or the queue is shutting down. If the item
    /// is in flight it is deferred until the worker calls [`WorkQueue::done`].
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            trace!(queue = self.shared.name, ?item, "deferring in-flight item");
            return;
        }
        state.queue.push_back(item);
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Add `item` once `delay` has elapsed
    ///
    /// Must be called from within a Tokio runtime when `delay` is non-zero.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Add `item` after its exponential backoff delay and count the failure
    pub fn add_rate_limited(&self, item: T) {
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(item.clone()).or_insert(0);
            let delay = self.shared.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        trace!(queue = self.shared.name, ?item, ?delay, "rate-limited re-add");
        self.add_after(item, delay);
    }

    /// Number of rate-limited re-adds since the last `forget`
    pub fn num_requeues<Q>(&self, item: &Q) -> u32
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().failures.get(item).copied().unwrap_or(0)
    }

    /// Reset the failure counter for `item`
    pub fn forget<Q>(&self, item: &Q)
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().failures.remove(item);
    }

    /// Wait for the next item
    ///
    /// Returns `None` once the queue is shut down and drained of queued items.
    /// The returned item is in flight until [`WorkQueue::done`] is called.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    metrics::set_queue_depth(state.queue.len());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.shared.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
                // Register before releasing the lock so an add in between is not missed
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Finish processing `item`
    ///
    /// Returns `true` if the item was re-added while in flight and is now queued again.
    pub fn done<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.shutting_down {
            return false;
        }
        if let Some(requeued) = state.dirty.get(item).cloned() {
            state.queue.push_back(requeued);
            metrics::set_queue_depth(state.queue.len());
            drop(state);
            self.shared.notify.notify_one();
            return true;
        }
        false
    }

    /// Whether `item` is currently held by a worker
    pub fn is_processing<Q>(&self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().processing.contains(item)
    }

    /// Number of queued items (excluding in-flight ones)
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and wake every waiting worker
    pub fn shut_down(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            // Workers exit instead of draining what is left
            state.queue.clear();
            state.dirty.clear();
            metrics::set_queue_depth(0);
        }
        self.shared.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(
            "test",
            ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_add_deduplicates_queued_items() {
        let q = queue();
        q.add("pv-1".to_string());
        q.add("pv-1".to_string());
        q.add("pv-2".to_string());
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await.as_deref(), Some("pv-1"));
        assert_eq!(q.get().await.as_deref(), Some("pv-2"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_item_is_deferred_until_done() {
        let q = queue();
        q.add("pv-1".to_string());
        let item = q.get().await.unwrap();
        assert!(q.is_processing(&item));

        q.add("pv-1".to_string());
        q.add("pv-1".to_string());
        assert!(q.is_empty(), "in-flight item must not be queued twice");

        assert!(q.done(&item));
        assert_eq!(q.len(), 1);
        assert!(!q.is_processing(&item));

        let again = q.get().await.unwrap();
        assert!(!q.done(&again));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_requeue_counts_failures() {
        let q = queue();
        let item = "pv-1".to_string();
        q.add_rate_limited(item.clone());
        q.add_rate_limited(item.clone());
        assert_eq!(q.num_requeues(&item), 2);

        let got = tokio::time::timeout(Duration::from_secs(1), q.get())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("pv-1"));

        q.forget(&item);
        assert_eq!(q.num_requeues(&item), 0);
    }

    #[tokio::test]
    async fn test_shut_down_releases_waiting_workers() {
        let q = queue();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move { q.get().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.shut_down();

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_none());
        }

        q.add("pv-1".to_string());
        assert!(q.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_wake_every_worker() {
        let q = queue();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move {
                    let item = q.get().await?;
                    q.done(&item);
                    Some(item)
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        for i in 0..4 {
            q.add(format!("pv-{i}"));
        }

        let mut seen = Vec::new();
        for worker in workers {
            let item = tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            seen.push(item);
        }
        seen.sort();
        assert_eq!(seen, vec!["pv-0", "pv-1", "pv-2", "pv-3"]);
    }
}
