//! # Storage Backend
//!
//! Health queries against the storage backend (CSI driver) and the normalized
//! result they map to.
//!
//! Two query shapes exist:
//! - controller scoped: volume id only, valid when the backend advertises the
//!   volume-health capability
//! - node scoped: volume id plus mount/staging paths; a missing health field
//!   means "no opinion", not unhealthy

mod error;
mod http;
pub mod paths;

pub use error::BackendError;
pub use http::HttpHealthClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Normalized volume health condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCondition {
    Unknown,
    Healthy,
    TemporarilyInaccessible,
    TemporarilyDegraded,
    FailureLikely,
    Fatal,
}

impl HealthCondition {
    /// Map the backend's numeric condition code
    ///
    /// Codes outside the known set are reported as `Unknown`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Healthy,
            10 => Self::TemporarilyInaccessible,
            20 => Self::TemporarilyDegraded,
            30 => Self::FailureLikely,
            40 => Self::Fatal,
            other => {
                warn!(code = other, "Unrecognised volume health condition code");
                Self::Unknown
            }
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Healthy => 1,
            Self::TemporarilyInaccessible => 10,
            Self::TemporarilyDegraded => 20,
            Self::FailureLikely => 30,
            Self::Fatal => 40,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::TemporarilyInaccessible => "temporarily-inaccessible",
            Self::TemporarilyDegraded => "temporarily-degraded",
            Self::FailureLikely => "failure-likely",
            Self::Fatal => "fatal",
        }
    }

    #[must_use]
    pub fn is_healthy(self) -> bool {
        self == Self::Healthy
    }
}

impl std::fmt::Display for HealthCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error reported by the backend alongside a condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for VolumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ErrorCode: {}, ErrorMessage: {}", self.code, self.message)
    }
}

/// Result of a single health query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    pub condition: HealthCondition,
    pub errors: Vec<VolumeError>,
}

impl HealthResult {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            condition: HealthCondition::Healthy,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.condition.is_healthy()
    }

    /// Error descriptors joined in backend order
    #[must_use]
    pub fn describe_errors(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Backend health query capability
#[async_trait]
pub trait VolumeHealthClient: Send + Sync {
    /// Whether controller-scoped health queries are supported
    async fn supports_controller_volume_health(&self) -> Result<bool, BackendError>;

    /// Controller-scoped health of a volume
    async fn controller_volume_health(&self, volume_id: &str) -> Result<HealthResult, BackendError>;

    /// Node-scoped health of a volume at its mount/staging paths
    ///
    /// `Ok(None)` means the backend reported no health information.
    async fn node_volume_health(
        &self,
        volume_id: &str,
        volume_path: &str,
        staging_path: &str,
    ) -> Result<Option<HealthResult>, BackendError>;
}
