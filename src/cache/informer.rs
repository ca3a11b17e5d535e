//! # Informer Cache
//!
//! [`ObjectCache`] backed by a `kube_runtime` reflector store and fed with
//! watcher events. Each applied event updates the store first and then fans
//! out to the registered handlers as add/update/delete notifications.

use super::{split_key, CacheError, ObjectCache, ResourceEventHandler};
use kube::Resource;
use kube_runtime::reflector::{store::Writer, ObjectRef, Store};
use kube_runtime::watcher;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

pub struct InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    kind: &'static str,
    store: Store<K>,
    writer: Mutex<Writer<K>>,
    handlers: RwLock<Vec<ResourceEventHandler<K>>>,
    synced: AtomicBool,
    // Objects seen during the current relist; None outside of a relist
    relist: Mutex<Option<HashSet<ObjectRef<K>>>>,
}

impl<K> std::fmt::Debug for InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InformerCache")
            .field("kind", &self.kind)
            .field("synced", &self.synced.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K> InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        let writer = Writer::default();
        let store = writer.as_reader();
        Self {
            kind,
            store,
            writer: Mutex::new(writer),
            handlers: RwLock::new(Vec::new()),
            synced: AtomicBool::new(false),
            relist: Mutex::new(None),
        }
    }

    /// Apply a watcher event to the store and notify handlers
    ///
    /// A relist (`Init` .. `InitDone`) reports every listed object as an add or
    /// update, and every previously cached object that did not come back as a
    /// delete, so deletions missed while the watch was down are not lost.
    pub fn apply(&self, event: &watcher::Event<K>) {
        match event {
            watcher::Event::Apply(obj) => {
                let old = self.store.get(&ObjectRef::from_obj(obj));
                self.write(event);
                self.notify_upsert(old.as_deref(), obj);
            }
            watcher::Event::Delete(obj) => {
                self.write(event);
                self.notify_delete(obj);
            }
            watcher::Event::Init => {
                *self.relist.lock().unwrap_or_else(PoisonError::into_inner) = Some(HashSet::new());
                self.write(event);
            }
            watcher::Event::InitApply(obj) => {
                let obj_ref = ObjectRef::from_obj(obj);
                // The store still serves the pre-relist state until InitDone
                let old = self.store.get(&obj_ref);
                self.relist
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert_with(HashSet::new)
                    .insert(obj_ref);
                self.write(event);
                self.notify_upsert(old.as_deref(), obj);
            }
            watcher::Event::InitDone => {
                let previous = self.store.state();
                let seen = self
                    .relist
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .unwrap_or_default();
                self.write(event);
                self.synced.store(true, Ordering::Release);
                debug!(kind = self.kind, objects = seen.len(), "cache synced");

                for old in previous {
                    if !seen.contains(&ObjectRef::from_obj(old.as_ref())) {
                        self.notify_delete(&old);
                    }
                }
            }
        }
    }

    fn write(&self, event: &watcher::Event<K>) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_watcher_event(event);
    }

    fn notify_upsert(&self, old: Option<&K>, new: &K) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            match old {
                Some(old) => {
                    if let Some(on_update) = &handler.on_update {
                        on_update(old, new);
                    }
                }
                None => {
                    if let Some(on_add) = &handler.on_add {
                        on_add(new);
                    }
                }
            }
        }
    }

    fn notify_delete(&self, obj: &K) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            if let Some(on_delete) = &handler.on_delete {
                on_delete(obj);
            }
        }
    }
}

impl<K> ObjectCache<K> for InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn list(&self) -> Result<Vec<Arc<K>>, CacheError> {
        if !self.has_synced() {
            return Err(CacheError::NotSynced(self.kind));
        }
        Ok(self.store.state())
    }

    fn get(&self, key: &str) -> Option<Arc<K>> {
        let obj_ref = match split_key(key) {
            (Some(namespace), name) => ObjectRef::new(name).within(namespace),
            (None, name) => ObjectRef::new(name),
        };
        self.store.get(&obj_ref)
    }

    fn add_event_handler(&self, handler: ResourceEventHandler<K>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}
