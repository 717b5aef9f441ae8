// crates/bridge/src/client.rs
//! The bridge HTTP client: submit, status, cancel, download.

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use forgeview_types::Job;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Envelope of `POST /jobs/start`.
#[derive(Debug, Deserialize)]
struct StartResponse {
    success: bool,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Envelope of `GET /jobs/status/{job_id}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    success: bool,
    #[serde(default)]
    job: Option<Job>,
    #[serde(default)]
    error: Option<String>,
}

/// Envelope of `POST /jobs/cancel/{job_id}`.
#[derive(Debug, Deserialize)]
struct CancelResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Stateless adapter over the bridge's job surface.
///
/// Every method is one round trip; nothing is cached or scheduled here.
/// Cloning is cheap (the underlying connection pool is shared).
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| BridgeError::Client { source })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a bridge-relative path (or pass an absolute URL through).
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Submit a job. Returns the bridge-assigned job id.
    pub async fn start_job(
        &self,
        job_type: &str,
        parameters: &serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<String, BridgeError> {
        let url = self.url("/jobs/start");
        let mut body = serde_json::json!({
            "job_type": job_type,
            "parameters": parameters,
        });
        if let Some(session) = session_id {
            body["session_id"] = session.into();
        }

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| BridgeError::transport(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus { url, status });
        }

        let payload: StartResponse = response
            .json()
            .await
            .map_err(|source| BridgeError::malformed(&url, source))?;

        if !payload.success {
            return Err(BridgeError::backend(payload.error));
        }
        payload
            .job_id
            .ok_or(BridgeError::MissingField { url, field: "job_id" })
    }

    /// Fetch the bridge's current view of one job.
    pub async fn job_status(&self, job_id: &str) -> Result<Job, BridgeError> {
        let url = self.url(&format!("/jobs/status/{job_id}"));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BridgeError::transport(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus { url, status });
        }

        let payload: StatusResponse = response
            .json()
            .await
            .map_err(|source| BridgeError::malformed(&url, source))?;

        if !payload.success {
            return Err(BridgeError::backend(payload.error));
        }
        payload
            .job
            .ok_or(BridgeError::MissingField { url, field: "job" })
    }

    /// Ask the bridge to cancel a job. `Ok(false)` means the bridge answered
    /// but declined (already terminal, unknown id, ...) — not an error.
    pub async fn cancel_job(&self, job_id: &str) -> Result<bool, BridgeError> {
        let url = self.url(&format!("/jobs/cancel/{job_id}"));

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|source| BridgeError::transport(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus { url, status });
        }

        let payload: CancelResponse = response
            .json()
            .await
            .map_err(|source| BridgeError::malformed(&url, source))?;

        if !payload.success {
            debug!(
                %job_id,
                reason = payload.error.as_deref().unwrap_or("none given"),
                "bridge declined cancellation"
            );
        }
        Ok(payload.success)
    }

    /// Fetch a result payload. `path` is usually the relative
    /// `result.download_url` of a completed job.
    pub async fn download(&self, path: &str) -> Result<Bytes, BridgeError> {
        let url = self.url(path);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BridgeError::transport(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus { url, status });
        }

        response
            .bytes()
            .await
            .map_err(|source| BridgeError::transport(&url, source))
    }
}
