// crates/bridge/src/error.rs
use thiserror::Error;

/// Errors from a bridge round trip.
///
/// Two classes matter to callers: transport-class errors (the bridge was
/// unreachable, answered with a non-success HTTP status, or sent a payload
/// we could not read) are candidates for retry; backend-class errors (a
/// well-formed payload reporting `success: false`) are content to surface.
/// [`BridgeError::is_transport`] draws that line.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to construct HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("bridge returned HTTP {status} for {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed payload from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("bridge response from {url} is missing `{field}`")]
    MissingField { url: String, field: &'static str },

    #[error("bridge error: {message}")]
    Backend { message: String },
}

impl BridgeError {
    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn malformed(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Malformed {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn backend(message: Option<String>) -> Self {
        Self::Backend {
            message: message.unwrap_or_else(|| "unspecified backend failure".to_string()),
        }
    }

    /// Whether this failure happened below the payload level.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::HttpStatus { .. }
                | Self::Malformed { .. }
                | Self::MissingField { .. }
        )
    }
}
