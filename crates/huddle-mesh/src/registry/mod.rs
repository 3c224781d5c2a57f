//! Room & participant registry.

mod quality;
mod roster;
mod service;
mod types;

pub use quality::{connection_quality, NetworkStats};
pub use roster::{Registry, RosterDiff};
pub use service::{CreateRoomRequest, JoinRoomRequest, LocalRoomService, RoomService};
pub use types::{
    hash_password, AudioQuality, Participant, ParticipantFlag, ParticipantRole, Room,
    RoomSettings, VideoQuality,
};
