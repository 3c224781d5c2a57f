use serde::{Deserialize, Serialize};

/// Defaults applied when rooms are created, plus roster polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub max_participants: u32,
    /// Rooms expire this many hours after creation.
    pub expiry_hours: u32,
    /// Interval of the roster-consistency poll against the room service.
    pub roster_poll_interval_secs: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 8,
            expiry_hours: 24,
            roster_poll_interval_secs: 5,
        }
    }
}
