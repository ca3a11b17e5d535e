//! Volume Health Monitor Library
//!
//! Kubernetes controller that checks the health of CSI volumes against the
//! storage backend and reports abnormal volumes as warning events on the
//! volume and on the pods using it.
//!
//! - `cache`: object caches over volumes, claims and pods
//! - `backend`: storage backend health queries
//! - `events`: warning event emission
//! - `controller`: the reconciliation engine (work queue, index, workers, resync)
//! - `config`, `cli`, `runtime`, `server`, `observability`: process plumbing

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod events;
pub mod observability;
pub mod runtime;
pub mod server;
