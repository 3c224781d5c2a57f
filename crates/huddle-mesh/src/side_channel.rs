//! Side-channel protocol: chat, reactions and whiteboard ops.
//!
//! One envelope serves both transports. Per remote peer a message goes
//! over that peer's data channel when it is ready and over signaling
//! otherwise, so each peer receives it exactly once. Subscribers see
//! [`SideMessage`]s without knowing which transport carried them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use huddle_common::EventBus;

use crate::error::{ProtocolError, SideChannelError};
use crate::protocol::{SignalingMessage, WhiteboardOp};
use crate::signaling::TransportMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SidePayload {
    Chat { text: String },
    Reaction { emoji: String },
    Whiteboard { op: WhiteboardOp },
}

impl SidePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SidePayload::Chat { .. } => "chat",
            SidePayload::Reaction { .. } => "reaction",
            SidePayload::Whiteboard { .. } => "whiteboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub payload: SidePayload,
    pub timestamp: DateTime<Utc>,
}

impl SideMessage {
    pub fn new(sender_id: impl Into<String>, sender_name: impl Into<String>, payload: SidePayload) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// The signaling form; `to` of `None` is a broadcast.
    pub fn to_signaling(&self, to: Option<String>) -> SignalingMessage {
        let from_participant = self.sender_id.clone();
        let participant_name = self.sender_name.clone();
        let timestamp = self.timestamp;
        match &self.payload {
            SidePayload::Chat { text } => SignalingMessage::Chat {
                from_participant,
                to_participant: to,
                participant_name,
                text: text.clone(),
                timestamp,
            },
            SidePayload::Reaction { emoji } => SignalingMessage::Reaction {
                from_participant,
                to_participant: to,
                participant_name,
                emoji: emoji.clone(),
                timestamp,
            },
            SidePayload::Whiteboard { op } => SignalingMessage::Whiteboard {
                from_participant,
                to_participant: to,
                participant_name,
                data: op.clone(),
                timestamp,
            },
        }
    }

    pub fn from_signaling(message: SignalingMessage) -> Result<Self, ProtocolError> {
        match message {
            SignalingMessage::Chat {
                from_participant,
                participant_name,
                text,
                timestamp,
                ..
            } => Ok(Self {
                sender_id: from_participant,
                sender_name: participant_name,
                payload: SidePayload::Chat { text },
                timestamp,
            }),
            SignalingMessage::Reaction {
                from_participant,
                participant_name,
                emoji,
                timestamp,
                ..
            } => Ok(Self {
                sender_id: from_participant,
                sender_name: participant_name,
                payload: SidePayload::Reaction { emoji },
                timestamp,
            }),
            SignalingMessage::Whiteboard {
                from_participant,
                participant_name,
                data,
                timestamp,
                ..
            } => Ok(Self {
                sender_id: from_participant,
                sender_name: participant_name,
                payload: SidePayload::Whiteboard { op: data },
                timestamp,
            }),
            other => Err(ProtocolError::NotSideChannel(other.kind())),
        }
    }

    /// Data-channel frame: the same JSON as the broadcast signaling form.
    pub fn encode_datagram(&self) -> Result<String, ProtocolError> {
        self.to_signaling(None).encode()
    }

    /// Decode a data-channel frame. The sender is the peer at the other end
    /// of the channel, whatever the frame claims.
    pub fn decode_datagram(text: &str, peer_id: &str) -> Result<Self, ProtocolError> {
        let mut message = Self::from_signaling(SignalingMessage::decode(text)?)?;
        message.sender_id = peer_id.to_string();
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Subscriber fan-out for received and locally posted side messages.
#[derive(Clone)]
pub struct SideChannelBus {
    bus: EventBus<SideMessage>,
}

impl SideChannelBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SideMessage> {
        self.bus.subscribe()
    }

    pub fn publish(&self, message: SideMessage) -> usize {
        self.bus.publish(message)
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Signaling part of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relayed {
    None,
    /// No peer has a ready data channel: one broadcast covers everyone.
    Broadcast,
    /// One addressed copy per peer without a ready data channel.
    Addressed(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub direct: Vec<String>,
    pub relayed: Relayed,
}

/// Split `peers` (id, data channel ready) between the two transports.
pub fn plan_route(peers: &[(String, bool)], mode: TransportMode) -> Result<RoutePlan, SideChannelError> {
    let direct: Vec<String> = peers
        .iter()
        .filter(|(_, ready)| *ready)
        .map(|(id, _)| id.clone())
        .collect();
    let uncovered: Vec<String> = peers
        .iter()
        .filter(|(_, ready)| !*ready)
        .map(|(id, _)| id.clone())
        .collect();

    if mode == TransportMode::Manual {
        if let Some(peer) = uncovered.first() {
            return Err(SideChannelError::NoRoute(peer.clone()));
        }
    }

    let relayed = if uncovered.is_empty() {
        Relayed::None
    } else if direct.is_empty() {
        Relayed::Broadcast
    } else {
        Relayed::Addressed(uncovered)
    };
    Ok(RoutePlan { direct, relayed })
}

/// How a posted message left this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Peers reached over their data channel.
    pub direct: usize,
    /// Peers reached over signaling.
    pub relayed: usize,
}
