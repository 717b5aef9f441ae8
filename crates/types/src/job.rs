// crates/types/src/job.rs
//! Job data model shared between the panel backend and the TypeScript UI.
//!
//! A [`Job`] is one backend-tracked asynchronous operation (a screenshot
//! capture, a batch render, ...). The bridge assigns the id at submission;
//! everything else is refreshed from the bridge's status endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Transitions are monotonic: `pending → processing → completed | failed`,
/// with `cancelled` reachable from either non-terminal state via an explicit
/// cancel request. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "codegen",
    derive(ts_rs::TS),
    ts(export, export_to = "../../web/src/types/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    // Older bridge builds report this state as "in_progress".
    #[serde(alias = "in_progress")]
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job can still change state.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Whether the job has reached a state it can never leave.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions of a rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "codegen",
    derive(ts_rs::TS),
    ts(export, export_to = "../../web/src/types/generated/")
)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Output metadata of a completed job, as reported by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "codegen",
    derive(ts_rs::TS),
    ts(export, export_to = "../../web/src/types/generated/")
)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One backend-tracked asynchronous operation.
///
/// Constructed by the job manager immediately after a successful submission
/// and thereafter replaced wholesale by whatever the status endpoint reports.
/// `result` and `error` are mutually exclusive: `result` appears only with
/// `Completed`, `error` only with `Failed`. `progress` is meaningful only
/// while `Processing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(
    feature = "codegen",
    derive(ts_rs::TS),
    ts(export, export_to = "../../web/src/types/generated/")
)]
pub struct Job {
    /// Opaque bridge-assigned identity; never changes after submission.
    pub job_id: String,
    /// Operation kind, e.g. "screenshot" or "batch_screenshot".
    pub job_type: String,
    /// Panel session the job was submitted from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: JobStatus,
    /// 0–100, non-decreasing while `Processing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Original submission parameters, kept verbatim for the job's lifetime.
    #[serde(default, alias = "params", skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    #[cfg_attr(feature = "codegen", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful status fetch.
    #[cfg_attr(feature = "codegen", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build the initial in-memory record for a freshly submitted job.
    pub fn pending(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            session_id: None,
            status: JobStatus::Pending,
            progress: None,
            result: None,
            error: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Download reference of a completed job. `None` for any other state,
    /// or when the bridge reported no downloadable output.
    pub fn download_url(&self) -> Option<&str> {
        if self.status != JobStatus::Completed {
            return None;
        }
        self.result.as_ref()?.download_url.as_deref()
    }

    /// Thumbnail reference of a completed job, same rules as [`Self::download_url`].
    pub fn thumbnail_url(&self) -> Option<&str> {
        if self.status != JobStatus::Completed {
            return None;
        }
        self.result.as_ref()?.thumbnail_url.as_deref()
    }
}
