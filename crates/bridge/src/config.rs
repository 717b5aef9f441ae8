// crates/bridge/src/config.rs
use std::time::Duration;

/// Where the engine bridge listens when nothing else is configured.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8080";

/// Configuration for the bridge HTTP client.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Per-request timeout. Status checks are cheap; anything slower than
    /// this counts as a transport failure and goes through the retry path.
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("FORGEVIEW_BRIDGE_URL")
                .unwrap_or_else(|_| DEFAULT_BRIDGE_URL.to_string()),
            request_timeout: Duration::from_secs(10),
        }
    }
}
