//! Configuration schema types for huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod ice;
mod logging;
mod peer;
mod room;
mod side_channel;
mod signaling;

pub use ice::*;
pub use logging::*;
pub use peer::*;
pub use room::*;
pub use side_channel::*;
pub use signaling::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub signaling: SignalingConfig,
    pub peer: PeerConfig,
    pub ice: IceConfig,
    pub room: RoomConfig,
    pub side_channel: SideChannelConfig,
    pub logging: LoggingConfig,
}
