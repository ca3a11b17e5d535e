//! # Object Caches
//!
//! Read-through caches over cluster objects (volumes, claims, pods), populated
//! by watch notifications.
//!
//! The reconciliation engine only depends on the [`ObjectCache`] capability:
//! list, get-by-key, a synced signal, and handler registration for
//! add/update/delete notifications. [`InformerCache`] implements it on top of a
//! `kube_runtime` reflector store.

mod informer;
mod watch;

pub use informer::InformerCache;
pub use watch::spawn_informer;

use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{0} cache has not completed its initial sync")]
    NotSynced(&'static str),
    #[error("failed to list {kind}: {reason}")]
    ListFailed { kind: &'static str, reason: String },
}

pub type AddHandler<K> = Box<dyn Fn(&K) + Send + Sync>;
pub type UpdateHandler<K> = Box<dyn Fn(&K, &K) + Send + Sync>;
pub type DeleteHandler<K> = Box<dyn Fn(&K) + Send + Sync>;

/// Notification callbacks registered against a cache
///
/// Handlers run on the cache's dispatch path, so they must be fast and must
/// never block or perform network I/O.
pub struct ResourceEventHandler<K> {
    pub on_add: Option<AddHandler<K>>,
    pub on_update: Option<UpdateHandler<K>>,
    pub on_delete: Option<DeleteHandler<K>>,
}

impl<K> Default for ResourceEventHandler<K> {
    fn default() -> Self {
        Self {
            on_add: None,
            on_update: None,
            on_delete: None,
        }
    }
}

impl<K> std::fmt::Debug for ResourceEventHandler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEventHandler")
            .field("on_add", &self.on_add.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .finish()
    }
}

impl<K> ResourceEventHandler<K> {
    #[must_use]
    pub fn on_add(mut self, f: impl Fn(&K) + Send + Sync + 'static) -> Self {
        self.on_add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_update(mut self, f: impl Fn(&K, &K) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_delete(mut self, f: impl Fn(&K) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Box::new(f));
        self
    }
}

/// Per-kind object cache capability
pub trait ObjectCache<K>: Send + Sync {
    /// Kind name, used in logs and errors
    fn kind(&self) -> &'static str;

    /// Whether the initial list has been delivered
    fn has_synced(&self) -> bool;

    /// All cached objects
    fn list(&self) -> Result<Vec<Arc<K>>, CacheError>;

    /// Object by key (`name` for cluster-scoped kinds, `namespace/name` otherwise)
    fn get(&self, key: &str) -> Option<Arc<K>>;

    /// Register notification callbacks
    fn add_event_handler(&self, handler: ResourceEventHandler<K>);
}

/// Cache key for an object: `namespace/name`, or `name` when cluster scoped
pub fn object_key<K: ResourceExt>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{}", obj.name_any()),
        _ => obj.name_any(),
    }
}

/// Split a cache key into `(namespace, name)`
#[must_use]
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PersistentVolume, Pod};
    use kube::api::ObjectMeta;

    #[test]
    fn test_object_key_cluster_scoped() {
        let pv = PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pv-1".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(object_key(&pv), "pv-1");
    }

    #[test]
    fn test_object_key_namespaced() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".into()),
                namespace: Some("apps".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(object_key(&pod), "apps/web-0");
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("apps/web-0"), (Some("apps"), "web-0"));
        assert_eq!(split_key("pv-1"), (None, "pv-1"));
    }
}
