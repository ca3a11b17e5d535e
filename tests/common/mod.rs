//! Common test utilities for the monitor integration tests
//!
//! Provides object fixtures, a scripted in-memory backend, a recording event
//! sink and a harness wiring them to a `VolumeHealthMonitor` over in-memory
//! informer caches.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, ObjectReference, PersistentVolume, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PersistentVolumeSpec, Pod,
    PodSpec, Volume,
};
use kube::api::ObjectMeta;
use kube_runtime::watcher;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use volume_health_monitor::backend::{
    BackendError, HealthCondition, HealthResult, VolumeError, VolumeHealthClient,
};
use volume_health_monitor::cache::{CacheError, InformerCache, ObjectCache, ResourceEventHandler};
use volume_health_monitor::config::ControllerConfig;
use volume_health_monitor::controller::{MonitorCaches, VolumeHealthMonitor};
use volume_health_monitor::events::EventSink;

pub const DRIVER: &str = "hostpath.csi.k8s.io";
pub const NAMESPACE: &str = "apps";

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // We use ring as the crypto provider (matches main application)
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn volume_id(pv_name: &str) -> String {
    format!("handle-{pv_name}")
}

/// CSI volume owned by `driver`, optionally bound to `apps/<claim>`
pub fn csi_volume(name: &str, driver: &str, claim: Option<&str>) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.into()),
            resource_version: Some("1".into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            csi: Some(CSIPersistentVolumeSource {
                driver: driver.into(),
                volume_handle: volume_id(name),
                ..Default::default()
            }),
            claim_ref: claim.map(|claim| ObjectReference {
                kind: Some("PersistentVolumeClaim".into()),
                namespace: Some(NAMESPACE.into()),
                name: Some(claim.into()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Same volume with a changed spec, as an update notification would carry
pub fn resized(pv: &PersistentVolume, generation: u32) -> PersistentVolume {
    let mut updated = pv.clone();
    if let Some(spec) = updated.spec.as_mut() {
        spec.storage_class_name = Some(format!("class-{generation}"));
    }
    updated.metadata.resource_version = Some(format!("{}", generation + 1));
    updated
}

/// Claim `apps/<name>` bound to `volume`
pub fn bound_claim(name: &str, volume: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(NAMESPACE.into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: Some(volume.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod `apps/<name>` mounting each of `claims`
pub fn pod_using(name: &str, claims: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(NAMESPACE.into()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(
                claims
                    .iter()
                    .enumerate()
                    .map(|(i, claim)| Volume {
                        name: format!("vol-{i}"),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: (*claim).to_string(),
                            read_only: None,
                        }),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn fatal(code: &str, message: &str) -> HealthResult {
    HealthResult {
        condition: HealthCondition::Fatal,
        errors: vec![VolumeError {
            code: code.into(),
            message: message.into(),
        }],
    }
}

/// Controller configuration with timings suited to tests
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        driver_name: DRIVER.into(),
        worker_threads: 2,
        resync_interval_secs: 1,
        enable_resync: false,
        max_retries: 5,
        backoff_base_ms: 1,
        backoff_max_secs: 1,
        cache_sync_timeout_secs: 1,
        cache_sync_poll_interval_ms: 10,
        backend_timeout_secs: 2,
        ..Default::default()
    }
}

// ============================================================================
// Fake backend
// ============================================================================

type Scripted = Result<HealthResult, BackendError>;

/// Scripted backend that counts calls and tracks per-volume concurrency
pub struct FakeHealthClient {
    supports_controller: AtomicBool,
    probe_calls: AtomicUsize,
    /// One-shot responses consumed before the sticky one
    scripted: Mutex<HashMap<String, VecDeque<Scripted>>>,
    /// Response once the script is exhausted (default: healthy)
    sticky: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: AtomicUsize,
    delay: Mutex<Duration>,
    node_result: Mutex<Option<HealthResult>>,
    node_calls: Mutex<Vec<(String, String, String)>>,
}

impl Default for FakeHealthClient {
    fn default() -> Self {
        Self {
            supports_controller: AtomicBool::new(true),
            probe_calls: AtomicUsize::new(0),
            scripted: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            node_result: Mutex::new(None),
            node_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeHealthClient {
    pub fn set_supports_controller(&self, supported: bool) {
        self.supports_controller.store(supported, Ordering::SeqCst);
    }

    /// Response returned for `volume_id` from now on
    pub fn set_health(&self, volume_id: &str, result: Scripted) {
        self.sticky
            .lock()
            .unwrap()
            .insert(volume_id.to_string(), result);
    }

    /// One-shot response returned before the sticky one
    pub fn push_response(&self, volume_id: &str, result: Scripted) {
        self.scripted
            .lock()
            .unwrap()
            .entry(volume_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_node_result(&self, result: Option<HealthResult>) {
        *self.node_result.lock().unwrap() = result;
    }

    pub fn calls(&self, volume_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(volume_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn node_calls(&self) -> Vec<(String, String, String)> {
        self.node_calls.lock().unwrap().clone()
    }

    fn next_response(&self, volume_id: &str) -> Scripted {
        if let Some(result) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(volume_id)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(volume_id)
            .cloned()
            .unwrap_or_else(|| Ok(HealthResult::healthy()))
    }
}

#[async_trait]
impl VolumeHealthClient for FakeHealthClient {
    async fn supports_controller_volume_health(&self) -> Result<bool, BackendError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.supports_controller.load(Ordering::SeqCst))
    }

    async fn controller_volume_health(&self, volume_id: &str) -> Result<HealthResult, BackendError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(volume_id.to_string())
            .or_default() += 1;
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let current = in_flight.entry(volume_id.to_string()).or_default();
            *current += 1;
            self.max_in_flight.fetch_max(*current, Ordering::SeqCst);
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        *self
            .in_flight
            .lock()
            .unwrap()
            .entry(volume_id.to_string())
            .or_default() -= 1;
        self.next_response(volume_id)
    }

    async fn node_volume_health(
        &self,
        volume_id: &str,
        volume_path: &str,
        staging_path: &str,
    ) -> Result<Option<HealthResult>, BackendError> {
        self.node_calls.lock().unwrap().push((
            volume_id.to_string(),
            volume_path.to_string(),
            staging_path.to_string(),
        ));
        Ok(self.node_result.lock().unwrap().clone())
    }
}

// ============================================================================
// Recording event sink
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub reason: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
    fail: AtomicBool,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, kind: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish_warning(
        &self,
        reference: &ObjectReference,
        reason: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("events API unavailable");
        }
        self.events.lock().unwrap().push(RecordedEvent {
            kind: reference.kind.clone().unwrap_or_default(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone().unwrap_or_default(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub volumes: Arc<InformerCache<PersistentVolume>>,
    pub claims: Arc<InformerCache<PersistentVolumeClaim>>,
    pub pods: Arc<InformerCache<Pod>>,
    pub backend: Arc<FakeHealthClient>,
    pub events: Arc<RecordingEventSink>,
    pub monitor: VolumeHealthMonitor,
}

impl Harness {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_volume_cache(config, |volumes| volumes)
    }

    /// Build the harness with the monitor reading volumes through `wrap`
    ///
    /// Notifications are still delivered through the returned `volumes` cache.
    pub fn with_volume_cache(
        config: ControllerConfig,
        wrap: impl FnOnce(Arc<dyn ObjectCache<PersistentVolume>>) -> Arc<dyn ObjectCache<PersistentVolume>>,
    ) -> Self {
        let volumes = Arc::new(InformerCache::new("PersistentVolume"));
        let claims = Arc::new(InformerCache::new("PersistentVolumeClaim"));
        let pods = Arc::new(InformerCache::new("Pod"));
        let backend = Arc::new(FakeHealthClient::default());
        let events = Arc::new(RecordingEventSink::default());

        let monitor = VolumeHealthMonitor::new(
            config,
            MonitorCaches {
                volumes: wrap(Arc::clone(&volumes) as Arc<dyn ObjectCache<PersistentVolume>>),
                claims: Arc::clone(&claims) as Arc<dyn ObjectCache<PersistentVolumeClaim>>,
                pods: Arc::clone(&pods) as Arc<dyn ObjectCache<Pod>>,
            },
            Arc::clone(&backend) as Arc<dyn VolumeHealthClient>,
            Arc::clone(&events) as Arc<dyn EventSink>,
        );

        Self {
            volumes,
            claims,
            pods,
            backend,
            events,
            monitor,
        }
    }

    /// Deliver the initial list of every cache and mark them synced
    pub fn sync(&self, volumes: Vec<PersistentVolume>, claims: Vec<PersistentVolumeClaim>, pods: Vec<Pod>) {
        initial_list(&self.pods, pods);
        initial_list(&self.claims, claims);
        initial_list(&self.volumes, volumes);
    }

    /// Drain the queue with a single worker until it stays empty
    pub async fn drain(&self) {
        while !self.monitor.queue().is_empty() {
            tokio::time::timeout(Duration::from_secs(2), self.monitor.process_next_item())
                .await
                .expect("worker iteration timed out");
        }
    }
}

// ============================================================================
// Failing cache
// ============================================================================

/// Cache whose `list` fails a fixed number of times before delegating
pub struct FlakyListCache<K> {
    inner: Arc<dyn ObjectCache<K>>,
    failures_left: AtomicUsize,
    list_calls: AtomicUsize,
}

impl<K> FlakyListCache<K> {
    pub fn new(inner: Arc<dyn ObjectCache<K>>, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl<K> ObjectCache<K> for FlakyListCache<K> {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    fn has_synced(&self) -> bool {
        self.inner.has_synced()
    }

    fn list(&self) -> Result<Vec<Arc<K>>, CacheError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CacheError::ListFailed {
                kind: self.inner.kind(),
                reason: "apiserver unavailable".into(),
            });
        }
        self.inner.list()
    }

    fn get(&self, key: &str) -> Option<Arc<K>> {
        self.inner.get(key)
    }

    fn add_event_handler(&self, handler: ResourceEventHandler<K>) {
        self.inner.add_event_handler(handler);
    }
}

pub fn initial_list<K>(cache: &InformerCache<K>, objects: Vec<K>)
where
    K: kube::Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    cache.apply(&watcher::Event::Init);
    for obj in objects {
        cache.apply(&watcher::Event::InitApply(obj));
    }
    cache.apply(&watcher::Event::InitDone);
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
