//! # HTTP Health Client
//!
//! JSON-over-HTTP implementation of [`VolumeHealthClient`].
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  /v1/controller/capabilities`
//! - `POST /v1/controller/volumes:get`
//! - `POST /v1/node/volumes:stats`

use super::{BackendError, HealthCondition, HealthResult, VolumeError, VolumeHealthClient};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Controller capability advertising volume health support
const VOLUME_CONDITION_CAPABILITY: &str = "VOLUME_CONDITION";

// ============================================================================
// Wire structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct CapabilitiesResponse {
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetVolumeRequest<'a> {
    volume_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetVolumeResponse {
    #[serde(default)]
    status: Option<VolumeStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeStatus {
    #[serde(default)]
    volume_health: Option<VolumeHealth>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeVolumeStatsRequest<'a> {
    volume_id: &'a str,
    volume_path: &'a str,
    staging_target_path: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeVolumeStatsResponse {
    #[serde(default)]
    volume_health: Option<VolumeHealth>,
}

#[derive(Debug, Deserialize)]
struct VolumeHealth {
    condition: i32,
    #[serde(default)]
    errors: Vec<VolumeError>,
}

impl From<VolumeHealth> for HealthResult {
    fn from(health: VolumeHealth) -> Self {
        Self {
            condition: HealthCondition::from_code(health.condition),
            errors: health.errors,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Backend health client over HTTP
#[derive(Debug, Clone)]
pub struct HttpHealthClient {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpHealthClient {
    /// Create a client for `base_url` with a per-request `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::transport)?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn map_request_error(&self, e: &reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if e.is_decode() {
            BackendError::malformed(e)
        } else {
            BackendError::transport(e)
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| self.map_request_error(&e))
    }

    async fn post_json<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, BackendError> {
        let response = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_request_error(&e))?;
        self.read_json(response).await
    }
}

fn require_volume_id(volume_id: &str) -> Result<(), BackendError> {
    if volume_id.is_empty() {
        return Err(BackendError::InvalidArgument("volume id is empty".into()));
    }
    Ok(())
}

#[async_trait]
impl VolumeHealthClient for HttpHealthClient {
    #[instrument(skip(self))]
    async fn supports_controller_volume_health(&self) -> Result<bool, BackendError> {
        let response = self
            .http_client
            .get(self.url("/v1/controller/capabilities"))
            .send()
            .await
            .map_err(|e| self.map_request_error(&e))?;
        let capabilities: CapabilitiesResponse = self.read_json(response).await?;
        debug!(capabilities = ?capabilities.capabilities, "Controller capabilities");
        Ok(capabilities
            .capabilities
            .iter()
            .any(|c| c == VOLUME_CONDITION_CAPABILITY))
    }

    #[instrument(skip(self))]
    async fn controller_volume_health(&self, volume_id: &str) -> Result<HealthResult, BackendError> {
        require_volume_id(volume_id)?;
        let response: GetVolumeResponse = self
            .post_json("/v1/controller/volumes:get", &GetVolumeRequest { volume_id })
            .await?;

        // The capability was advertised, so a missing health field is a protocol violation
        response
            .status
            .and_then(|s| s.volume_health)
            .map(HealthResult::from)
            .ok_or_else(|| BackendError::malformed("controller response has no volume health"))
    }

    #[instrument(skip(self))]
    async fn node_volume_health(
        &self,
        volume_id: &str,
        volume_path: &str,
        staging_path: &str,
    ) -> Result<Option<HealthResult>, BackendError> {
        require_volume_id(volume_id)?;
        let response: NodeVolumeStatsResponse = self
            .post_json(
                "/v1/node/volumes:stats",
                &NodeVolumeStatsRequest {
                    volume_id,
                    volume_path,
                    staging_target_path: staging_path,
                },
            )
            .await?;
        Ok(response.volume_health.map(HealthResult::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_response_maps_condition_and_errors() {
        let body = r#"{"status":{"volumeHealth":{"condition":40,"errors":[{"code":"E1","message":"disk lost"}]}}}"#;
        let response: GetVolumeResponse = serde_json::from_str(body).unwrap();
        let result = HealthResult::from(response.status.unwrap().volume_health.unwrap());
        assert_eq!(result.condition, HealthCondition::Fatal);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "disk lost");
    }

    #[test]
    fn test_node_response_without_health_is_none() {
        let response: NodeVolumeStatsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.volume_health.is_none());
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let body = serde_json::to_value(NodeVolumeStatsRequest {
            volume_id: "vol-1",
            volume_path: "/a",
            staging_target_path: "/b",
        })
        .unwrap();
        assert_eq!(body["volumeId"], "vol-1");
        assert_eq!(body["stagingTargetPath"], "/b");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpHealthClient::new("http://backend:9808/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/v1/controller/capabilities"),
            "http://backend:9808/v1/controller/capabilities"
        );
    }
}
