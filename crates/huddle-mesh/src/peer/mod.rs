//! Peer connection manager and the per-peer state machine.

mod engine;
mod link;
mod manager;
mod state;

pub use engine::{
    ConnectionOptions, EngineEvent, EngineEventSink, IceServers, RtcConnection, RtcEngine,
    TransportState,
};
pub use link::PeerLinkSnapshot;
pub use manager::{PeerEffect, PeerManager, PeerManagerOptions};
pub use state::{ConnectionState, Role};
