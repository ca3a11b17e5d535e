//! # Cache Watch
//!
//! Drives an [`InformerCache`] from a Kubernetes watch stream.

use super::{InformerCache, ObjectCache};
use futures::{pin_mut, StreamExt};
use kube::{Api, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Start watching `api` and feed every event into `cache`
///
/// Stream errors are logged and the watcher retries with its default backoff;
/// they are never fatal to the process.
pub fn spawn_informer<K>(
    api: Api<K>,
    cache: Arc<InformerCache<K>>,
    config: watcher::Config,
) -> JoinHandle<()>
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + Send
        + Sync
        + 'static,
{
    tokio::spawn(async move {
        let kind = cache.kind();
        info!(kind, "Starting watch");

        let stream = watcher(api, config).default_backoff();
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(event) => cache.apply(&event),
                Err(e) => {
                    warn!(kind, error = %e, "Error watching objects, watcher will retry");
                }
            }
        }

        warn!(kind, "Watch stream ended");
    })
}
