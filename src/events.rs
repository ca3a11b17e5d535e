//! # Events
//!
//! Emission of Kubernetes events against volumes and pods.

use crate::constants::EVENT_ACTION_HEALTH_CHECK;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};

/// Sink for warning events attached to cluster objects
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish a warning-level event on `reference`
    async fn publish_warning(
        &self,
        reference: &ObjectReference,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// [`EventSink`] backed by the Kubernetes events API
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    /// Events are reported by `csi-monitor <driver>`; the instance is the pod name when known
    #[must_use]
    pub fn new(client: Client, driver_name: &str) -> Self {
        let reporter = Reporter {
            controller: format!("csi-monitor {driver_name}"),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventRecorder {
    async fn publish_warning(
        &self,
        reference: &ObjectReference,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: EVENT_ACTION_HEALTH_CHECK.to_string(),
            secondary: None,
        };
        self.recorder
            .publish(&event, reference)
            .await
            .with_context(|| {
                format!(
                    "Failed to publish event on {}/{}",
                    reference.kind.as_deref().unwrap_or("object"),
                    reference.name.as_deref().unwrap_or("unknown")
                )
            })
    }
}
