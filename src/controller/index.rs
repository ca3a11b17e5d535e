//! # Claim Index
//!
//! In-process state shared by the event handlers and the workers:
//!
//! - claim → pods: which pods currently mount each claim, maintained from pod
//!   add/delete notifications
//! - pending set: volumes that are queued and not yet checked
//!
//! Both live behind one mutex. Critical sections only touch the maps; no I/O
//! happens while the lock is held.

use crate::observability::metrics;
use k8s_openapi::api::core::v1::ObjectReference;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct IndexState {
    /// claim uid -> pod key -> reference used for event emission
    claims: HashMap<String, HashMap<String, ObjectReference>>,
    pending: HashSet<String>,
}

/// Claim-to-pod index and pending set
#[derive(Debug, Default)]
pub struct VolumeIndex {
    state: Mutex<IndexState>,
}

impl VolumeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that the pod `pod_key` mounts each of `claim_uids`
    pub fn add_pod<'a>(
        &self,
        pod_key: &str,
        pod_ref: &ObjectReference,
        claim_uids: impl IntoIterator<Item = &'a str>,
    ) {
        let mut state = self.lock();
        for claim in claim_uids {
            state
                .claims
                .entry(claim.to_string())
                .or_default()
                .insert(pod_key.to_string(), pod_ref.clone());
        }
        metrics::set_indexed_claims(state.claims.len());
    }

    /// Remove the pod `pod_key` from each of `claim_uids`, dropping claims left empty
    pub fn remove_pod<'a>(&self, pod_key: &str, claim_uids: impl IntoIterator<Item = &'a str>) {
        let mut state = self.lock();
        for claim in claim_uids {
            if let Some(pods) = state.claims.get_mut(claim) {
                pods.remove(pod_key);
                if pods.is_empty() {
                    state.claims.remove(claim);
                }
            }
        }
        metrics::set_indexed_claims(state.claims.len());
    }

    /// Pods currently mounting `claim_uid`, ordered by pod key
    #[must_use]
    pub fn pods_for_claim(&self, claim_uid: &str) -> Vec<ObjectReference> {
        let state = self.lock();
        let Some(pods) = state.claims.get(claim_uid) else {
            return Vec::new();
        };
        let mut entries: Vec<_> = pods.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, r)| r.clone()).collect()
    }

    #[must_use]
    pub fn contains_claim(&self, claim_uid: &str) -> bool {
        self.lock().claims.contains_key(claim_uid)
    }

    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.lock().claims.len()
    }

    /// Run `f` with the pending set locked
    ///
    /// Used to make a pending-set transition atomic with the matching queue
    /// operation. `f` must not block.
    pub fn with_pending<R>(&self, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        f(&mut self.lock().pending)
    }

    #[must_use]
    pub fn is_pending(&self, volume: &str) -> bool {
        self.lock().pending.contains(volume)
    }
}
