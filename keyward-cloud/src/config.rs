//! Control plane client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`CloudApiClient`](crate::CloudApiClient).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL for the Keyward API (e.g., "https://api.keyward.app").
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.keyward.app".to_string(),
            request_timeout_secs: 30,
        }
    }
}
