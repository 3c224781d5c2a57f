//! Signaling channel.
//!
//! One duplex transport per session, either the online relay
//! ([`RelaySignaling`]) or copy/paste exchange codes ([`ManualExchange`]).
//! Both deliver inbound traffic as [`SignalingEvent`]s on the channel
//! handed to [`SignalingTransport::connect`], so the peer state machine
//! never branches on the mode.

mod exchange;
mod manual;
mod relay;

pub use exchange::{render_qr, ExchangeCode};
pub use manual::{ManualExchange, MANUAL_PEER_ID};
pub use relay::{RelayOptions, RelaySignaling};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::SignalingError;
use crate::protocol::{SdpType, SignalingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    Relay,
    Manual,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Relay => "relay",
            TransportMode::Manual => "manual",
        }
    }
}

/// Inbound traffic and lifecycle of a signaling transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// First successful connect.
    Connected,
    /// The link dropped; messages in flight are lost.
    Disconnected,
    /// Connected again after a drop, `join` already re-announced.
    Reconnected,
    /// Closed for good after [`SignalingTransport::close`].
    Closed,
    Message(SignalingMessage),
    /// A local description is ready to be handed to the other human.
    ExchangeCodeReady {
        participant_id: String,
        kind: SdpType,
        code: String,
    },
    /// A pasted code named the remote party.
    PeerIdentified {
        participant_id: String,
        display_name: String,
    },
}

/// Who we announce as when the channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub room_id: String,
    pub participant_id: String,
    pub participant_name: String,
    pub is_host: bool,
}

impl Announce {
    pub fn to_join(&self) -> SignalingMessage {
        SignalingMessage::Join {
            room_id: self.room_id.clone(),
            participant_id: self.participant_id.clone(),
            participant_name: self.participant_name.clone(),
            is_host: self.is_host,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SignalingTransport: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Open the channel and announce the local participant. Inbound
    /// traffic is delivered on `events` until the transport closes.
    async fn connect(
        &mut self,
        announce: Announce,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<(), SignalingError>;

    async fn send(&mut self, message: SignalingMessage) -> Result<(), SignalingError>;

    /// Close without reconnecting. Idempotent.
    async fn close(&mut self);

    /// Feed a code pasted by the human.
    async fn accept_exchange_code(&mut self, code: &str, expect: SdpType) -> Result<(), SignalingError> {
        let _ = (code, expect);
        Err(SignalingError::Unsupported("exchange codes"))
    }
}
