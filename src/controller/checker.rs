//! # Volume Checker
//!
//! Health decision for a single volume: query the backend, stay silent when
//! the volume is healthy, and report anything else as warning events on the
//! volume and on the pods using it.

use super::handlers::claim_uid;
use super::index::VolumeIndex;
use crate::backend::paths::{device_mount_path, pod_volume_path};
use crate::backend::{BackendError, HealthCondition, HealthResult, VolumeHealthClient};
use crate::cache::ObjectCache;
use crate::config::ControllerConfig;
use crate::constants::EVENT_REASON_VOLUME_ABNORMAL;
use crate::events::EventSink;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolume, PersistentVolumeClaim};
use kube::{Resource, ResourceExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Result of one volume check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Backend reported the volume healthy; nothing emitted
    Healthy,
    /// Backend reported an abnormal condition
    Unhealthy {
        condition: HealthCondition,
        /// Warning events successfully published
        events: usize,
    },
    /// Backend returned no health information
    NoOpinion,
    /// Check not applicable (capability missing, or volume not ours)
    Skipped,
    /// Volume no longer in the cache
    Missing,
}

impl CheckOutcome {
    /// Label used for the checks metric
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy { .. } => "unhealthy",
            Self::NoOpinion => "no_opinion",
            Self::Skipped => "skipped",
            Self::Missing => "missing",
        }
    }
}

/// Message carried by the warning event on the volume
#[must_use]
pub fn volume_event_message(result: &HealthResult) -> String {
    if result.errors.is_empty() {
        format!("Volume health condition is {}", result.condition)
    } else {
        format!(
            "Volume health condition is {}: {}",
            result.condition,
            result.describe_errors()
        )
    }
}

/// Message carried by the warning event on a pod using the volume
#[must_use]
pub fn pod_event_message(pv_name: &str, result: &HealthResult) -> String {
    format!("Persistent volume {pv_name}: {}", volume_event_message(result))
}

pub struct VolumeChecker {
    client: Arc<dyn VolumeHealthClient>,
    events: Arc<dyn EventSink>,
    claims: Arc<dyn ObjectCache<PersistentVolumeClaim>>,
    index: Arc<VolumeIndex>,
    timeout: Duration,
    kubelet_root: PathBuf,
    report_pod_events: bool,
    // Set once the capability probe succeeds; a failed probe is retried on the next check
    controller_capability: OnceCell<bool>,
}

impl std::fmt::Debug for VolumeChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeChecker")
            .field("timeout", &self.timeout)
            .field("kubelet_root", &self.kubelet_root)
            .field("report_pod_events", &self.report_pod_events)
            .field("controller_capability", &self.controller_capability.get())
            .finish_non_exhaustive()
    }
}

impl VolumeChecker {
    #[must_use]
    pub fn new(
        client: Arc<dyn VolumeHealthClient>,
        events: Arc<dyn EventSink>,
        claims: Arc<dyn ObjectCache<PersistentVolumeClaim>>,
        index: Arc<VolumeIndex>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            client,
            events,
            claims,
            index,
            timeout: config.backend_timeout(),
            kubelet_root: config.kubelet_root_dir.clone(),
            report_pod_events: config.report_pod_events,
            controller_capability: OnceCell::new(),
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)))
    }

    /// Whether the backend supports controller-scoped health queries
    ///
    /// # Errors
    ///
    /// Returns the backend error if the capability probe fails.
    pub async fn supports_controller_checks(&self) -> Result<bool, BackendError> {
        self.controller_capability
            .get_or_try_init(|| async {
                let supported = self
                    .with_timeout(self.client.supports_controller_volume_health())
                    .await?;
                info!(supported, "Probed controller volume health capability");
                Ok::<_, BackendError>(supported)
            })
            .await
            .copied()
    }

    /// Controller-scoped check of `pv`
    ///
    /// # Errors
    ///
    /// Returns the backend error if the capability probe or the health query fails.
    pub async fn check_controller_volume(
        &self,
        pv: &PersistentVolume,
    ) -> Result<CheckOutcome, BackendError> {
        let name = pv.name_any();
        let Some(volume_id) = volume_handle(pv) else {
            debug!(volume = %name, "volume has no CSI source");
            return Ok(CheckOutcome::Skipped);
        };

        if !self.supports_controller_checks().await? {
            debug!(volume = %name, "backend does not support controller volume health");
            return Ok(CheckOutcome::Skipped);
        }

        let result = self
            .with_timeout(self.client.controller_volume_health(volume_id))
            .await?;

        if result.is_healthy() {
            debug!(volume = %name, "volume is healthy");
            return Ok(CheckOutcome::Healthy);
        }
        Ok(self.report_volume(pv, &result).await)
    }

    /// Node-scoped check of `pv` as mounted into the pod `pod`
    ///
    /// Abnormal results are reported on the pod only.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidArgument`] if the pod reference has no UID,
    /// or the backend error if the query fails.
    pub async fn check_node_volume(
        &self,
        pv: &PersistentVolume,
        pod: &ObjectReference,
    ) -> Result<CheckOutcome, BackendError> {
        let name = pv.name_any();
        let Some(volume_id) = volume_handle(pv) else {
            return Ok(CheckOutcome::Skipped);
        };
        let pod_uid = pod
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| BackendError::InvalidArgument("pod reference has no uid".into()))?;

        let staging_path = device_mount_path(&self.kubelet_root, &name)?;
        let volume_path = pod_volume_path(&self.kubelet_root, &name, pod_uid);

        let result = self
            .with_timeout(self.client.node_volume_health(
                volume_id,
                &volume_path.to_string_lossy(),
                &staging_path.to_string_lossy(),
            ))
            .await?;

        let Some(result) = result else {
            debug!(volume = %name, pod_uid, "node reported no volume health");
            return Ok(CheckOutcome::NoOpinion);
        };
        if result.is_healthy() {
            return Ok(CheckOutcome::Healthy);
        }

        metrics::increment_unhealthy(result.condition.as_str());
        warn!(volume = %name, pod_uid, condition = %result.condition, "abnormal volume on node");
        let published = self
            .publish(pod, &pod_event_message(&name, &result))
            .await;
        Ok(CheckOutcome::Unhealthy {
            condition: result.condition,
            events: usize::from(published),
        })
    }

    async fn report_volume(&self, pv: &PersistentVolume, result: &HealthResult) -> CheckOutcome {
        let name = pv.name_any();
        metrics::increment_unhealthy(result.condition.as_str());
        warn!(
            volume = %name,
            condition = %result.condition,
            errors = %result.describe_errors(),
            "abnormal volume condition"
        );

        let mut events = 0;
        if self
            .publish(&pv.object_ref(&()), &volume_event_message(result))
            .await
        {
            events += 1;
        }

        if self.report_pod_events {
            let pod_message = pod_event_message(&name, result);
            for pod in self.pods_using(pv) {
                if self.publish(&pod, &pod_message).await {
                    events += 1;
                }
            }
        }

        CheckOutcome::Unhealthy {
            condition: result.condition,
            events,
        }
    }

    /// Pods mounting `pv` through its bound claim
    ///
    /// Only trusted when the claim is cached and bound back to this volume.
    fn pods_using(&self, pv: &PersistentVolume) -> Vec<ObjectReference> {
        let pv_name = pv.name_any();
        let Some(claim_ref) = pv.spec.as_ref().and_then(|s| s.claim_ref.as_ref()) else {
            return Vec::new();
        };
        let (Some(namespace), Some(claim_name)) =
            (claim_ref.namespace.as_deref(), claim_ref.name.as_deref())
        else {
            return Vec::new();
        };

        let uid = claim_uid(namespace, claim_name);
        let bound = self
            .claims
            .get(&uid)
            .and_then(|pvc| pvc.spec.as_ref().and_then(|s| s.volume_name.clone()))
            .is_some_and(|volume_name| volume_name == pv_name);
        if !bound {
            debug!(volume = %pv_name, claim = %uid, "claim not bound to volume, skipping pod events");
            return Vec::new();
        }
        self.index.pods_for_claim(&uid)
    }

    async fn publish(&self, reference: &ObjectReference, message: &str) -> bool {
        let kind = reference.kind.as_deref().unwrap_or("Unknown");
        match self
            .events
            .publish_warning(reference, EVENT_REASON_VOLUME_ABNORMAL, message)
            .await
        {
            Ok(()) => {
                metrics::increment_events(kind);
                true
            }
            Err(e) => {
                metrics::increment_event_errors();
                warn!(
                    kind,
                    name = reference.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to publish volume health event"
                );
                false
            }
        }
    }
}

fn volume_handle(pv: &PersistentVolume) -> Option<&str> {
    pv.spec
        .as_ref()
        .and_then(|spec| spec.csi.as_ref())
        .map(|csi| csi.volume_handle.as_str())
}
