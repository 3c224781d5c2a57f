//! Conferencing session: the single event loop that drives the mesh.

mod driver;
mod handle;
mod types;

pub use handle::MeshSession;
pub use types::{
    DefaultTransports, MeshOptions, NewRoom, ParticipantChange, SessionDeps, SessionEvent, SessionInput,
    SessionSnapshot, SignalingStatus, TimerKind, TransportFactory,
};
