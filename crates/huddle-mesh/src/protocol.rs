//! Signaling wire protocol.
//!
//! Every frame on the signaling channel is one JSON object tagged by
//! `type` with camelCase fields. Decoding validates the frame before any
//! handler sees it: unknown types, missing fields and empty participant
//! ids are rejected as [`ProtocolError`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// SDP / ICE
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SDP offer or answer, shaped like `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate, shaped like `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Whiteboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One collaborative drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum WhiteboardOp {
    Stroke {
        id: String,
        points: Vec<Point>,
        color: String,
        width: f32,
    },
    Erase {
        id: String,
    },
    Clear,
}

// ---------------------------------------------------------------------------
// Roster entries
// ---------------------------------------------------------------------------

/// A participant as announced on the wire (`room-participants`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub participant_name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default = "default_true")]
    pub audio_enabled: bool,
    #[serde(default = "default_true")]
    pub video_enabled: bool,
    #[serde(default)]
    pub screen_sharing: bool,
    #[serde(default)]
    pub hand_raised: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Signaling messages
// ---------------------------------------------------------------------------

/// Every message carried by the signaling channel.
///
/// `offer`, `answer` and `ice-candidate` are always point-to-point.
/// Side-channel variants (`chat`, `reaction`, `whiteboard`) are broadcast
/// when `toParticipant` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        participant_id: String,
        participant_name: String,
        #[serde(default)]
        is_host: bool,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        participant_id: String,
        participant_name: String,
        #[serde(default)]
        is_host: bool,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        participant_id: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    RoomParticipants { participants: Vec<ParticipantInfo> },
    #[serde(rename_all = "camelCase")]
    ParticipantUpdated {
        participant_id: String,
        audio_enabled: bool,
        video_enabled: bool,
        screen_sharing: bool,
        hand_raised: bool,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Offer {
        from_participant: String,
        to_participant: String,
        offer: SessionDescription,
        #[serde(default)]
        candidates: Vec<IceCandidateInit>,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        from_participant: String,
        to_participant: String,
        answer: SessionDescription,
        #[serde(default)]
        candidates: Vec<IceCandidateInit>,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        from_participant: String,
        to_participant: String,
        candidate: IceCandidateInit,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        from_participant: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_participant: Option<String>,
        #[serde(default)]
        participant_name: String,
        text: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Reaction {
        from_participant: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_participant: Option<String>,
        #[serde(default)]
        participant_name: String,
        emoji: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Whiteboard {
        from_participant: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_participant: Option<String>,
        #[serde(default)]
        participant_name: String,
        data: WhiteboardOp,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl SignalingMessage {
    /// Parse and validate one wire frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let message: SignalingMessage =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Join { .. } => "join",
            SignalingMessage::ParticipantJoined { .. } => "participant-joined",
            SignalingMessage::ParticipantLeft { .. } => "participant-left",
            SignalingMessage::RoomParticipants { .. } => "room-participants",
            SignalingMessage::ParticipantUpdated { .. } => "participant-updated",
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice-candidate",
            SignalingMessage::Chat { .. } => "chat",
            SignalingMessage::Reaction { .. } => "reaction",
            SignalingMessage::Whiteboard { .. } => "whiteboard",
        }
    }

    /// The originating participant for routed and side-channel messages.
    pub fn sender(&self) -> Option<&str> {
        match self {
            SignalingMessage::Offer {
                from_participant, ..
            }
            | SignalingMessage::Answer {
                from_participant, ..
            }
            | SignalingMessage::IceCandidate {
                from_participant, ..
            }
            | SignalingMessage::Chat {
                from_participant, ..
            }
            | SignalingMessage::Reaction {
                from_participant, ..
            }
            | SignalingMessage::Whiteboard {
                from_participant, ..
            } => Some(from_participant),
            _ => None,
        }
    }

    /// The addressed participant, `None` for broadcasts.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            SignalingMessage::Offer { to_participant, .. }
            | SignalingMessage::Answer { to_participant, .. }
            | SignalingMessage::IceCandidate { to_participant, .. } => Some(to_participant),
            SignalingMessage::Chat { to_participant, .. }
            | SignalingMessage::Reaction { to_participant, .. }
            | SignalingMessage::Whiteboard { to_participant, .. } => to_participant.as_deref(),
            _ => None,
        }
    }

    /// Rewrite the sender field; the relay stamps it from the connection.
    pub fn set_sender(&mut self, participant_id: &str) {
        match self {
            SignalingMessage::Offer {
                from_participant, ..
            }
            | SignalingMessage::Answer {
                from_participant, ..
            }
            | SignalingMessage::IceCandidate {
                from_participant, ..
            }
            | SignalingMessage::Chat {
                from_participant, ..
            }
            | SignalingMessage::Reaction {
                from_participant, ..
            }
            | SignalingMessage::Whiteboard {
                from_participant, ..
            } => *from_participant = participant_id.to_string(),
            _ => {}
        }
    }

    pub fn is_side_channel(&self) -> bool {
        matches!(
            self,
            SignalingMessage::Chat { .. }
                | SignalingMessage::Reaction { .. }
                | SignalingMessage::Whiteboard { .. }
        )
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let kind = self.kind();
        let non_empty = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(ProtocolError::EmptyField { kind, field })
            } else {
                Ok(())
            }
        };

        match self {
            SignalingMessage::Join {
                room_id,
                participant_id,
                ..
            } => {
                non_empty("roomId", room_id)?;
                non_empty("participantId", participant_id)
            }
            SignalingMessage::ParticipantJoined { participant_id, .. }
            | SignalingMessage::ParticipantLeft { participant_id, .. }
            | SignalingMessage::ParticipantUpdated { participant_id, .. } => {
                non_empty("participantId", participant_id)
            }
            SignalingMessage::RoomParticipants { participants } => participants
                .iter()
                .try_for_each(|p| non_empty("participantId", &p.participant_id)),
            SignalingMessage::Offer {
                from_participant,
                to_participant,
                offer,
                ..
            } => {
                non_empty("fromParticipant", from_participant)?;
                non_empty("toParticipant", to_participant)?;
                non_empty("offer.sdp", &offer.sdp)
            }
            SignalingMessage::Answer {
                from_participant,
                to_participant,
                answer,
                ..
            } => {
                non_empty("fromParticipant", from_participant)?;
                non_empty("toParticipant", to_participant)?;
                non_empty("answer.sdp", &answer.sdp)
            }
            SignalingMessage::IceCandidate {
                from_participant,
                to_participant,
                ..
            } => {
                non_empty("fromParticipant", from_participant)?;
                non_empty("toParticipant", to_participant)
            }
            SignalingMessage::Chat {
                from_participant, ..
            }
            | SignalingMessage::Reaction {
                from_participant, ..
            }
            | SignalingMessage::Whiteboard {
                from_participant, ..
            } => non_empty("fromParticipant", from_participant),
        }
    }
}
