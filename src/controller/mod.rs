//! # Controller
//!
//! Volume health reconciliation engine.
//!
//! - `backoff`: Exponential backoff for per-volume retries
//! - `workqueue`: De-duplicating, rate-limited work queue
//! - `index`: Claim-to-pod index and pending set
//! - `handlers`: Cache notification handlers
//! - `checker`: Per-volume health decision and event reporting
//! - `monitor`: Startup sequencing, worker pool and shutdown
//! - `worker`: One reconcile iteration
//! - `resync`: Periodic full resync

pub mod backoff;
pub mod checker;
pub mod handlers;
pub mod index;
pub mod monitor;
mod resync;
mod worker;
pub mod workqueue;

pub use checker::{CheckOutcome, VolumeChecker};
pub use handlers::{claim_uid, enqueue_volume, is_managed_volume, pod_claim_uids, Enqueue};
pub use index::VolumeIndex;
pub use monitor::{MonitorCaches, MonitorError, VolumeHealthMonitor};
pub use workqueue::WorkQueue;
