//! # Event Handlers
//!
//! Callbacks registered on the object caches. They run on the cache dispatch
//! path, so they only touch in-memory state: the claim index, the pending set
//! and the work queue.
//!
//! - Volume add/update: enqueue volumes owned by this driver, skipping updates
//!   that change neither spec nor status.
//! - Pod add/delete: maintain the claim-to-pod index.
//! - Pod updates are not consumed; a pod's volume list is fixed once it is created.

use super::index::VolumeIndex;
use super::workqueue::WorkQueue;
use crate::cache::{object_key, ResourceEventHandler};
use k8s_openapi::api::core::v1::{PersistentVolume, Pod};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// Newly marked pending and queued
    Queued,
    /// Currently being checked; queued again once that check finishes
    Deferred,
    /// Already pending and waiting in the queue
    AlreadyPending,
}

/// Identity of a claim in the index
#[must_use]
pub fn claim_uid(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Claims mounted by `pod`, as index identities
///
/// Generic ephemeral volumes are included: their claim is named
/// `<pod name>-<volume name>`.
#[must_use]
pub fn pod_claim_uids(pod: &Pod) -> Vec<String> {
    let namespace = pod.namespace().unwrap_or_default();
    let pod_name = pod.name_any();
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    let mut claims: Vec<String> = spec
        .volumes
        .iter()
        .flatten()
        .filter_map(|volume| {
            if let Some(pvc) = &volume.persistent_volume_claim {
                Some(claim_uid(&namespace, &pvc.claim_name))
            } else if volume.ephemeral.is_some() {
                Some(claim_uid(&namespace, &format!("{pod_name}-{}", volume.name)))
            } else {
                None
            }
        })
        .collect();
    claims.sort();
    claims.dedup();
    claims
}

/// Whether `pv` is provisioned by `driver`
#[must_use]
pub fn is_managed_volume(pv: &PersistentVolume, driver: &str) -> bool {
    pv.spec
        .as_ref()
        .and_then(|spec| spec.csi.as_ref())
        .is_some_and(|csi| !driver.is_empty() && csi.driver == driver)
}

/// Whether an update carries a semantic change worth re-checking
fn volume_changed(old: &PersistentVolume, new: &PersistentVolume) -> bool {
    old.spec != new.spec || old.status != new.status
}

/// Enqueue `volume` unless it is already pending
///
/// The pending-set transition and the queue operation happen under the index
/// lock, so a worker finishing the same volume either sees the re-add or lets
/// it through as a fresh entry.
pub fn enqueue_volume(queue: &WorkQueue<String>, index: &VolumeIndex, volume: &str) -> Enqueue {
    index.with_pending(|pending| {
        let key = volume.to_string();
        if pending.insert(key.clone()) {
            queue.add(key);
            Enqueue::Queued
        } else if queue.is_processing(&key) {
            queue.add(key);
            Enqueue::Deferred
        } else {
            Enqueue::AlreadyPending
        }
    })
}

/// Handlers for volume notifications
pub(crate) fn volume_handler(
    driver: Arc<str>,
    queue: WorkQueue<String>,
    index: Arc<VolumeIndex>,
) -> ResourceEventHandler<PersistentVolume> {
    let (add_driver, add_queue, add_index) = (Arc::clone(&driver), queue.clone(), Arc::clone(&index));

    ResourceEventHandler::default()
        .on_add(move |pv: &PersistentVolume| {
            if is_managed_volume(pv, &add_driver) {
                let result = enqueue_volume(&add_queue, &add_index, &pv.name_any());
                trace!(volume = %pv.name_any(), ?result, "volume added");
            }
        })
        .on_update(move |old: &PersistentVolume, new: &PersistentVolume| {
            if !is_managed_volume(new, &driver) {
                return;
            }
            if !volume_changed(old, new) {
                trace!(volume = %new.name_any(), "skipping no-op volume update");
                return;
            }
            let result = enqueue_volume(&queue, &index, &new.name_any());
            trace!(volume = %new.name_any(), ?result, "volume updated");
        })
}

/// Handlers for pod notifications
pub(crate) fn pod_handler(index: Arc<VolumeIndex>) -> ResourceEventHandler<Pod> {
    let add_index = Arc::clone(&index);

    ResourceEventHandler::default()
        .on_add(move |pod: &Pod| {
            let claims = pod_claim_uids(pod);
            if claims.is_empty() {
                return;
            }
            let key = object_key(pod);
            debug!(pod = %key, claims = claims.len(), "indexing pod claims");
            add_index.add_pod(&key, &pod.object_ref(&()), claims.iter().map(String::as_str));
        })
        .on_delete(move |pod: &Pod| {
            let claims = pod_claim_uids(pod);
            if claims.is_empty() {
                return;
            }
            let key = object_key(pod);
            debug!(pod = %key, claims = claims.len(), "removing pod from claim index");
            index.remove_pod(&key, claims.iter().map(String::as_str));
        })
}
