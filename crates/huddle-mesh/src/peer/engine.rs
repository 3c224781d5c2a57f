//! RTC engine boundary.
//!
//! The native peer-connection stack sits behind [`RtcEngine`] and
//! [`RtcConnection`]. Its callbacks (candidates, transport state, remote
//! tracks, data channel traffic) come back as [`EngineEvent`]s through an
//! [`EngineEventSink`], tagged with the link epoch they belong to, and are
//! fed into the session's single input queue.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use huddle_config::schema::IceConfig;

use crate::error::EngineError;
use crate::media::StreamHandle;
use crate::protocol::{IceCandidateInit, SessionDescription};
use crate::registry::NetworkStats;
use crate::session::SessionInput;

/// Transport-level state reported by the native connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    IceCandidate(IceCandidateInit),
    GatheringComplete,
    TransportStateChanged(TransportState),
    RemoteStream(StreamHandle),
    DataChannelOpen,
    DataChannelClosed,
    DataMessage(String),
    Stats(NetworkStats),
}

/// Where a connection delivers its callbacks.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    participant_id: String,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl EngineEventSink {
    pub(crate) fn new(
        participant_id: impl Into<String>,
        epoch: u64,
        tx: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            epoch,
            tx,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the session has gone away.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(SessionInput::Engine {
                participant_id: self.participant_id.clone(),
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// ICE servers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceServers {
    pub stun: Vec<String>,
    pub turn: Vec<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl IceServers {
    /// `RTCConfiguration`-shaped JSON for engine adapters.
    pub fn to_json(&self) -> serde_json::Value {
        let mut servers = vec![json!({ "urls": self.stun })];
        if !self.turn.is_empty() {
            let mut turn = json!({ "urls": self.turn });
            if let Some(username) = &self.turn_username {
                turn["username"] = json!(username);
            }
            if let Some(credential) = &self.turn_credential {
                turn["credential"] = json!(credential);
            }
            servers.push(turn);
        }
        json!({ "iceServers": servers })
    }
}

impl From<&IceConfig> for IceServers {
    fn from(config: &IceConfig) -> Self {
        Self {
            stun: config.stun_servers.clone(),
            turn: config.turn_servers.clone(),
            turn_username: config.turn_username.clone(),
            turn_credential: config.turn_credential.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub ice_servers: IceServers,
    pub data_channel_label: String,
    /// The initiator opens the data channel; the responder accepts it.
    pub negotiate_data_channel: bool,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait RtcEngine: Send + Sync {
    fn create_connection(
        &self,
        participant_id: &str,
        options: &ConnectionOptions,
        sink: EngineEventSink,
    ) -> Result<Box<dyn RtcConnection>, EngineError>;
}

/// One native peer connection.
///
/// `create_offer` and `create_answer` also apply the description locally,
/// which starts ICE gathering.
#[async_trait]
pub trait RtcConnection: Send + Sync {
    /// A `Screen` stream replaces the outgoing video track in place;
    /// detaching it restores the camera track.
    async fn attach_local_stream(&mut self, stream: &StreamHandle) -> Result<(), EngineError>;

    async fn detach_local_stream(&mut self, stream: &StreamHandle) -> Result<(), EngineError>;

    async fn create_offer(&mut self, ice_restart: bool) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, EngineError>;

    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<(), EngineError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidateInit) -> Result<(), EngineError>;

    async fn send_data(&mut self, text: &str) -> Result<(), EngineError>;

    async fn close(&mut self);
}
