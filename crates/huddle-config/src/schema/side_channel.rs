use serde::{Deserialize, Serialize};

/// Chat / reaction / whiteboard bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SideChannelConfig {
    /// Buffered messages per subscriber before it starts lagging.
    pub bus_capacity: u32,
    /// Label of the negotiated data channel.
    pub data_channel_label: String,
}

impl Default for SideChannelConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            data_channel_label: "huddle".into(),
        }
    }
}
