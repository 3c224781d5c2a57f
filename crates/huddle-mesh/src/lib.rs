//! Mesh conferencing core.
//!
//! Every participant holds one peer link to every other participant.
//! Signaling goes over a relay or, without one, through copy/paste
//! exchange codes. [`MeshSession`] owns the whole thing and is driven by a
//! single event loop; everything platform-specific (room storage, capture
//! devices, the native RTC stack) is injected through [`SessionDeps`].

pub mod error;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod side_channel;
pub mod signaling;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use error::{
    EngineError, ExchangeCodeError, MediaError, ProtocolError, RoomError, SessionError, SideChannelError,
    SignalingError,
};
pub use media::{LocalStream, MediaConstraints, MediaSource, StreamHandle, StreamKind};
pub use peer::{ConnectionState, EngineEvent, RtcConnection, RtcEngine, Role};
pub use protocol::{SignalingMessage, WhiteboardOp};
pub use registry::{JoinRoomRequest, LocalRoomService, Participant, Room, RoomService, RoomSettings};
pub use session::{DefaultTransports, MeshOptions, MeshSession, NewRoom, SessionDeps, SessionEvent};
pub use side_channel::{DeliveryReport, SideMessage, SidePayload};
pub use signaling::{RelayOptions, TransportMode};
