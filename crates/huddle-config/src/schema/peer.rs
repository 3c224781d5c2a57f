use serde::{Deserialize, Serialize};

/// Timing and retry limits for each peer connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Upper bound on waiting for ICE gathering before a description is sent.
    pub ice_gathering_timeout_ms: u32,
    /// How long a disconnected link may take to recover before it is closed.
    pub disconnect_grace_secs: u32,
    /// Automatic re-offers allowed per disconnect or failure.
    pub max_retries: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_gathering_timeout_ms: 2000,
            disconnect_grace_secs: 10,
            max_retries: 1,
        }
    }
}
