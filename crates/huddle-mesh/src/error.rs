//! Error taxonomy for the mesh core.
//!
//! Transport errors never end a session, negotiation errors end a single
//! peer link, resource errors end the attempt to start or join a room.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed signaling message: {0}")]
    Malformed(String),

    #[error("signaling message `{kind}` has an empty {field}")]
    EmptyField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("`{0}` is not a side-channel message")]
    NotSideChannel(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeCodeError {
    #[error("exchange code is empty")]
    Empty,

    #[error("exchange code is not valid base64: {0}")]
    Base64(String),

    #[error("exchange code is not valid JSON: {0}")]
    Json(String),

    #[error("expected an {expected} code, got an {found} code")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel is closed")]
    Closed,

    #[error("signaling connect failed: {0}")]
    Connect(String),

    #[error("{0} is not supported by this signaling transport")]
    Unsupported(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    ExchangeCode(#[from] ExchangeCodeError),
}

/// Failures reported by the RTC engine while negotiating one peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("peer connection failure: {0}")]
    Connection(String),

    #[error("data channel is not open")]
    DataChannelClosed,
}

/// Room service failures, surfaced to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found with the provided access code")]
    NotFound,

    #[error("room is locked and not accepting new participants")]
    Locked,

    #[error("room is full (max {max} participants)")]
    Full { max: usize },

    #[error("room has expired")]
    Expired,

    #[error("incorrect room password")]
    IncorrectPassword,

    #[error("screen sharing is not allowed in this room")]
    ScreenShareDisabled,

    #[error("participant not found")]
    ParticipantNotFound,

    #[error("only the host can change room settings")]
    NotHost,

    #[error("room service error: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("media device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SideChannelError {
    #[error("not in a room")]
    NotInRoom,

    #[error("chat is disabled in this room")]
    ChatDisabled,

    #[error("no route to {0}: data channel closed and no relay available")]
    NoRoute(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    ExchangeCode(#[from] ExchangeCodeError),

    #[error(transparent)]
    SideChannel(#[from] SideChannelError),

    #[error("already in a room")]
    AlreadyInRoom,

    #[error("not in a room")]
    NotInRoom,

    #[error("a manual peer link already exists")]
    ManualPeerExists,

    #[error("no manual peer link is waiting for a code")]
    NoManualPeer,

    #[error("operation requires {0} signaling")]
    WrongMode(&'static str),

    #[error("session task has stopped")]
    Stopped,
}

impl From<SessionError> for huddle_common::HuddleError {
    fn from(err: SessionError) -> Self {
        huddle_common::HuddleError::Mesh(err.to_string())
    }
}
