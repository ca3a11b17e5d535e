//! # Initialization
//!
//! Process initialization: rustls setup, tracing, metrics, probe server startup
//! and Kubernetes client setup.

use crate::config::{ControllerConfig, ServerConfig};
use crate::observability;
use crate::server::{self, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Initialization result containing what the monitor needs to start
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Server state for probes
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins; otherwise the crate logs at `log_level`.
pub fn init_tracing(log_level: &str) {
    let fallback = format!("volume_health_monitor={}", log_level.to_lowercase());
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .try_init();
}

/// Initialize the process runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
///
/// # Errors
///
/// Returns an error if metrics cannot be registered, the probe port cannot be
/// bound, or no Kubernetes client configuration is available.
pub async fn initialize(
    controller_config: &ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    // An already installed provider is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing(&controller_config.log_level);

    info!("Starting volume health monitor");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        driver = %controller_config.driver_name,
        backend = %controller_config.backend_endpoint,
        workers = controller_config.worker_threads,
        resync_interval_secs = controller_config.resync_interval_secs,
        enable_resync = controller_config.enable_resync,
        "Loaded configuration"
    );

    // Initialize metrics
    observability::metrics::register_metrics()?;

    // Readiness is flipped by the monitor once its workers are running
    let server_state = Arc::new(ServerState::new());

    // Bind before spawning so a busy port fails startup instead of a background task
    let listener = server::bind(server_config.metrics_port)
        .await
        .with_context(|| format!("Failed to bind metrics port {}", server_config.metrics_port))?;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = server::start_server(listener, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    Ok(InitializationResult {
        client,
        server_state,
    })
}
