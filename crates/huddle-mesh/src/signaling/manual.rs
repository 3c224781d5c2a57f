//! Relay-less signaling by copy/paste.
//!
//! Outgoing offers and answers become [`ExchangeCode`]s for the human to
//! hand over; a pasted code comes back in as an ordinary offer or answer
//! from [`MANUAL_PEER_ID`]. Exactly two parties: there is one remote peer
//! and no trickle, so candidates must travel inside the code.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::exchange::ExchangeCode;
use super::{Announce, SignalingEvent, SignalingTransport, TransportMode};
use crate::error::SignalingError;
use crate::protocol::{IceCandidateInit, SdpType, SessionDescription, SignalingMessage};

/// Participant id the single manual peer is known by.
pub const MANUAL_PEER_ID: &str = "manual-peer";

#[derive(Default)]
pub struct ManualExchange {
    announce: Option<Announce>,
    events: Option<mpsc::UnboundedSender<SignalingEvent>>,
}

impl ManualExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: SignalingEvent) -> Result<(), SignalingError> {
        let events = self.events.as_ref().ok_or(SignalingError::Closed)?;
        events.send(event).map_err(|_| SignalingError::Closed)
    }

    fn surface_code(
        &self,
        to: String,
        description: SessionDescription,
        candidates: Vec<IceCandidateInit>,
    ) -> Result<(), SignalingError> {
        let announce = self.announce.as_ref().ok_or(SignalingError::Closed)?;
        let kind = description.kind;
        let code = ExchangeCode::new(description, candidates)
            .with_sender(&announce.participant_id, &announce.participant_name);
        info!(kind = %kind, candidates = code.candidates.len(), "Exchange code ready");
        self.emit(SignalingEvent::ExchangeCodeReady {
            participant_id: to,
            kind,
            code: code.encode()?,
        })
    }
}

#[async_trait]
impl SignalingTransport for ManualExchange {
    fn mode(&self) -> TransportMode {
        TransportMode::Manual
    }

    async fn connect(
        &mut self,
        announce: Announce,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<(), SignalingError> {
        self.announce = Some(announce);
        self.events = Some(events);
        self.emit(SignalingEvent::Connected)
    }

    async fn send(&mut self, message: SignalingMessage) -> Result<(), SignalingError> {
        match message {
            SignalingMessage::Offer {
                to_participant,
                offer,
                candidates,
                ..
            } => self.surface_code(to_participant, offer, candidates),
            SignalingMessage::Answer {
                to_participant,
                answer,
                candidates,
                ..
            } => self.surface_code(to_participant, answer, candidates),
            SignalingMessage::IceCandidate { .. } => {
                debug!("Dropping late candidate, manual exchange has no trickle");
                Ok(())
            }
            SignalingMessage::Chat { .. }
            | SignalingMessage::Reaction { .. }
            | SignalingMessage::Whiteboard { .. } => {
                Err(SignalingError::Unsupported("side-channel messages"))
            }
            other => {
                debug!(kind = other.kind(), "No manual route, dropping");
                Ok(())
            }
        }
    }

    async fn close(&mut self) {
        if self.events.is_some() {
            let _ = self.emit(SignalingEvent::Closed);
        }
        self.events = None;
        self.announce = None;
    }

    async fn accept_exchange_code(&mut self, code: &str, expect: SdpType) -> Result<(), SignalingError> {
        let local_id = self
            .announce
            .as_ref()
            .map(|a| a.participant_id.clone())
            .ok_or(SignalingError::Closed)?;
        let decoded = ExchangeCode::decode(code)?.expect_kind(expect)?;

        if let Some(display_name) = decoded.display_name.clone() {
            self.emit(SignalingEvent::PeerIdentified {
                participant_id: MANUAL_PEER_ID.to_string(),
                display_name,
            })?;
        }

        let description = decoded.description();
        let message = match decoded.kind {
            SdpType::Offer => SignalingMessage::Offer {
                from_participant: MANUAL_PEER_ID.to_string(),
                to_participant: local_id,
                offer: description,
                candidates: decoded.candidates,
            },
            SdpType::Answer => SignalingMessage::Answer {
                from_participant: MANUAL_PEER_ID.to_string(),
                to_participant: local_id,
                answer: description,
                candidates: decoded.candidates,
            },
        };
        self.emit(SignalingEvent::Message(message))
    }
}
