//! Signaling relay connection settings.

use serde::{Deserialize, Serialize};

/// How the client reaches the online signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay (`ws://` or `wss://`).
    pub relay_url: String,
    /// Fixed delay between reconnect attempts, in seconds.
    pub reconnect_delay_secs: u32,
    /// Give up on a single connect attempt after this many seconds.
    pub connect_timeout_secs: u32,
    /// Interval between WebSocket pings, in seconds.
    pub heartbeat_interval_secs: u32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8787".into(),
            reconnect_delay_secs: 3,
            connect_timeout_secs: 15,
            heartbeat_interval_secs: 25,
        }
    }
}
