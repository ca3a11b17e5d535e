//! # Runtime
//!
//! Process bootstrap for the `volume-health-monitor` binary.
//!
//! - `initialization`: rustls, tracing, metrics, probe server and Kubernetes client
//! - `watch_loop`: informers, backend client, event recorder and the monitor itself

pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_monitor;
