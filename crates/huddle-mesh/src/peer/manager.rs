//! Peer connection manager.
//!
//! Owns every [`PeerLink`] keyed by participant id and is the only code
//! that touches them. Each method handles one input to completion and
//! returns the [`PeerEffect`]s the session must act on: messages to send,
//! state changes to surface, links that failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::engine::{ConnectionOptions, EngineEvent, EngineEventSink, IceServers, RtcEngine, TransportState};
use super::link::{PeerLink, PeerLinkSnapshot};
use super::state::{ConnectionState, Role};
use crate::error::EngineError;
use crate::media::{LocalStream, StreamHandle};
use crate::protocol::{IceCandidateInit, SdpType, SessionDescription, SignalingMessage};
use crate::registry::NetworkStats;
use crate::session::{SessionInput, TimerKind};
use crate::supervisor::spawn_timer;

/// Something the session must do or report after a manager call.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEffect {
    Send(SignalingMessage),
    StateChanged {
        participant_id: String,
        state: ConnectionState,
        reason: Option<String>,
    },
    RemoteStream {
        participant_id: String,
        stream: StreamHandle,
    },
    SideChannelReady {
        participant_id: String,
        ready: bool,
    },
    DataMessage {
        participant_id: String,
        text: String,
    },
    Stats {
        participant_id: String,
        stats: NetworkStats,
    },
    /// The link was removed in `Failed`.
    Failed {
        participant_id: String,
        role: Role,
        retry_count: u32,
        reason: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PeerManagerOptions {
    pub ice_servers: IceServers,
    pub data_channel_label: String,
    pub gathering_timeout: Duration,
}

pub struct PeerManager {
    engine: Arc<dyn RtcEngine>,
    options: PeerManagerOptions,
    local_id: String,
    inputs: mpsc::UnboundedSender<SessionInput>,
    links: HashMap<String, PeerLink>,
    next_epoch: u64,
    screen: Option<LocalStream>,
}

impl PeerManager {
    pub fn new(
        engine: Arc<dyn RtcEngine>,
        options: PeerManagerOptions,
        inputs: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        Self {
            engine,
            options,
            local_id: String::new(),
            inputs,
            links: HashMap::new(),
            next_epoch: 1,
            screen: None,
        }
    }

    pub fn set_local_id(&mut self, local_id: impl Into<String>) {
        self.local_id = local_id.into();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.links.contains_key(participant_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.links.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn state(&self, participant_id: &str) -> Option<ConnectionState> {
        self.links.get(participant_id).map(|l| l.state)
    }

    pub fn role(&self, participant_id: &str) -> Option<Role> {
        self.links.get(participant_id).map(|l| l.role)
    }

    pub fn epoch(&self, participant_id: &str) -> Option<u64> {
        self.links.get(participant_id).map(|l| l.epoch)
    }

    pub fn retry_count(&self, participant_id: &str) -> Option<u32> {
        self.links.get(participant_id).map(|l| l.retry_count)
    }

    pub fn is_side_channel_ready(&self, participant_id: &str) -> bool {
        self.links
            .get(participant_id)
            .is_some_and(|l| l.side_channel_ready())
    }

    pub fn snapshot(&self, participant_id: &str) -> Option<PeerLinkSnapshot> {
        self.links.get(participant_id).map(PeerLink::snapshot)
    }

    pub fn snapshots(&self) -> Vec<PeerLinkSnapshot> {
        let mut all: Vec<PeerLinkSnapshot> = self.links.values().map(PeerLink::snapshot).collect();
        all.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        all
    }

    /// Any camera stream currently attached to a link.
    pub fn shared_local_stream(&self) -> Option<LocalStream> {
        self.links.values().find_map(|l| l.local_stream.clone())
    }

    // -----------------------------------------------------------------------
    // Link lifecycle
    // -----------------------------------------------------------------------

    /// Create the link for `participant_id`, replacing any existing one.
    /// An initiator starts gathering for its offer right away; a responder
    /// waits in `New` for the offer.
    pub async fn add_peer(
        &mut self,
        participant_id: &str,
        role: Role,
        stream: Option<LocalStream>,
        retry_count: u32,
    ) -> Vec<PeerEffect> {
        let mut effects = Vec::new();

        if let Some(old) = self.links.remove(participant_id) {
            debug!(participant_id = %participant_id, epoch = old.epoch, "Replacing peer link");
            shutdown(old).await;
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let options = ConnectionOptions {
            ice_servers: self.options.ice_servers.clone(),
            data_channel_label: self.options.data_channel_label.clone(),
            negotiate_data_channel: role == Role::Initiator,
        };
        let sink = EngineEventSink::new(participant_id, epoch, self.inputs.clone());
        let connection = match self.engine.create_connection(participant_id, &options, sink) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(participant_id = %participant_id, error = %e, "Failed to create peer connection");
                effects.push(PeerEffect::StateChanged {
                    participant_id: participant_id.to_string(),
                    state: ConnectionState::Failed,
                    reason: Some(e.to_string()),
                });
                effects.push(PeerEffect::Failed {
                    participant_id: participant_id.to_string(),
                    role,
                    retry_count,
                    reason: e.to_string(),
                    retryable: false,
                });
                return effects;
            }
        };

        let link = PeerLink {
            participant_id: participant_id.to_string(),
            role,
            state: ConnectionState::New,
            epoch,
            connection,
            local_stream: None,
            screen_stream: None,
            remote_stream: None,
            data_channel_open: false,
            remote_description_set: false,
            pending_candidates: Default::default(),
            gathered: Vec::new(),
            outgoing: None,
            retry_count,
            gathering_timer: None,
            correlation_id: huddle_common::new_correlation_id(),
        };
        info!(
            participant_id = %participant_id,
            role = ?role,
            epoch,
            cid = %link.correlation_id,
            "Peer link created"
        );
        self.links.insert(participant_id.to_string(), link);
        effects.push(PeerEffect::StateChanged {
            participant_id: participant_id.to_string(),
            state: ConnectionState::New,
            reason: None,
        });

        let screen = self.screen.clone();
        if let Err(e) = self.attach_streams(participant_id, stream, screen).await {
            effects.extend(self.fail(participant_id, e.to_string(), false).await);
            return effects;
        }

        if role == Role::Initiator {
            if let Err(e) = self.start_offer(participant_id, &mut effects).await {
                effects.extend(self.fail(participant_id, e.to_string(), false).await);
            }
        }
        effects
    }

    async fn attach_streams(
        &mut self,
        participant_id: &str,
        camera: Option<LocalStream>,
        screen: Option<LocalStream>,
    ) -> Result<(), EngineError> {
        let Some(link) = self.links.get_mut(participant_id) else {
            return Ok(());
        };
        if let Some(camera) = camera {
            link.connection.attach_local_stream(camera.handle()).await?;
            link.local_stream = Some(camera);
        }
        if let Some(screen) = screen {
            link.connection.attach_local_stream(screen.handle()).await?;
            link.screen_stream = Some(screen);
        }
        Ok(())
    }

    async fn start_offer(&mut self, participant_id: &str, effects: &mut Vec<PeerEffect>) -> Result<(), EngineError> {
        let Some(link) = self.links.get_mut(participant_id) else {
            return Ok(());
        };
        transition(link, ConnectionState::Gathering, None, effects);
        let offer = link.connection.create_offer(false).await?;
        link.outgoing = Some(offer);
        link.gathered.clear();
        link.gathering_timer = Some(spawn_timer(
            self.inputs.clone(),
            participant_id.to_string(),
            link.epoch,
            TimerKind::GatheringGrace,
            self.options.gathering_timeout,
        ));
        Ok(())
    }

    /// Explicit teardown: the link ends in `Closed`.
    pub async fn close(&mut self, participant_id: &str, reason: Option<String>) -> Vec<PeerEffect> {
        let Some(link) = self.links.remove(participant_id) else {
            return Vec::new();
        };
        info!(participant_id = %participant_id, cid = %link.correlation_id, "Closing peer link");
        shutdown(link).await;
        vec![PeerEffect::StateChanged {
            participant_id: participant_id.to_string(),
            state: ConnectionState::Closed,
            reason,
        }]
    }

    /// Terminal failure: the link ends in `Failed` and is removed.
    pub async fn fail(&mut self, participant_id: &str, reason: String, retryable: bool) -> Vec<PeerEffect> {
        let Some(link) = self.links.remove(participant_id) else {
            return Vec::new();
        };
        warn!(
            participant_id = %participant_id,
            cid = %link.correlation_id,
            state = %link.state,
            reason = %reason,
            "Peer link failed"
        );
        let role = link.role;
        let retry_count = link.retry_count;
        shutdown(link).await;
        vec![
            PeerEffect::StateChanged {
                participant_id: participant_id.to_string(),
                state: ConnectionState::Failed,
                reason: Some(reason.clone()),
            },
            PeerEffect::Failed {
                participant_id: participant_id.to_string(),
                role,
                retry_count,
                reason,
                retryable,
            },
        ]
    }

    pub async fn close_all(&mut self) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        for id in self.ids() {
            effects.extend(self.close(&id, Some("left room".into())).await);
        }
        self.screen = None;
        effects
    }

    // -----------------------------------------------------------------------
    // Signaling input
    // -----------------------------------------------------------------------

    /// Feed one negotiation message addressed to the local participant.
    pub async fn handle_signal(&mut self, message: SignalingMessage) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        match message {
            SignalingMessage::Offer {
                from_participant,
                offer,
                candidates,
                ..
            } => {
                self.on_offer(&from_participant, offer, candidates, &mut effects)
                    .await
            }
            SignalingMessage::Answer {
                from_participant,
                answer,
                candidates,
                ..
            } => {
                self.on_answer(&from_participant, answer, candidates, &mut effects)
                    .await
            }
            SignalingMessage::IceCandidate {
                from_participant,
                candidate,
                ..
            } => {
                self.on_remote_candidate(&from_participant, candidate, &mut effects)
                    .await
            }
            other => debug!(kind = other.kind(), "Ignoring non-negotiation message"),
        }
        effects
    }

    async fn on_offer(
        &mut self,
        from: &str,
        offer: SessionDescription,
        candidates: Vec<IceCandidateInit>,
        effects: &mut Vec<PeerEffect>,
    ) {
        let Some(link) = self.links.get(from) else {
            warn!(participant_id = %from, "Offer from unknown peer, ignoring");
            return;
        };
        if link.role == Role::Initiator {
            warn!(participant_id = %from, "Offer reached an initiator link, ignoring");
            return;
        }
        let stream = link.local_stream.clone();
        let retry_count = link.retry_count;
        let state = link.state;

        match state {
            ConnectionState::New => {}
            ConnectionState::Connected | ConnectionState::Disconnected => {
                if let Err(e) = self.answer_restart(from, offer, candidates, effects).await {
                    effects.extend(self.fail(from, e.to_string(), false).await);
                }
                return;
            }
            ConnectionState::Answering | ConnectionState::Connecting => {
                // The initiator started over; follow it with a fresh link.
                effects.extend(self.add_peer(from, Role::Responder, stream, retry_count).await);
            }
            state => {
                warn!(participant_id = %from, state = %state, "Unexpected offer, ignoring");
                return;
            }
        }

        if let Err(e) = self.accept_offer(from, offer, candidates, effects).await {
            effects.extend(self.fail(from, e.to_string(), false).await);
        }
    }

    async fn accept_offer(
        &mut self,
        from: &str,
        offer: SessionDescription,
        candidates: Vec<IceCandidateInit>,
        effects: &mut Vec<PeerEffect>,
    ) -> Result<(), EngineError> {
        let Some(link) = self.links.get_mut(from) else {
            return Ok(());
        };
        link.connection.set_remote_description(offer).await?;
        link.remote_description_set = true;
        flush_candidates(link, candidates).await?;

        transition(link, ConnectionState::Answering, None, effects);
        let answer = link.connection.create_answer().await?;
        link.outgoing = Some(answer);
        link.gathered.clear();
        link.gathering_timer = Some(spawn_timer(
            self.inputs.clone(),
            from.to_string(),
            link.epoch,
            TimerKind::GatheringGrace,
            self.options.gathering_timeout,
        ));
        Ok(())
    }

    /// ICE restart offer on an established link: answer at once, the state
    /// stays where it is.
    async fn answer_restart(
        &mut self,
        from: &str,
        offer: SessionDescription,
        candidates: Vec<IceCandidateInit>,
        effects: &mut Vec<PeerEffect>,
    ) -> Result<(), EngineError> {
        let Some(link) = self.links.get_mut(from) else {
            return Ok(());
        };
        debug!(participant_id = %from, cid = %link.correlation_id, "Answering ICE restart");
        link.connection.set_remote_description(offer).await?;
        flush_candidates(link, candidates).await?;
        let answer = link.connection.create_answer().await?;
        effects.push(PeerEffect::Send(SignalingMessage::Answer {
            from_participant: self.local_id.clone(),
            to_participant: from.to_string(),
            answer,
            candidates: Vec::new(),
        }));
        Ok(())
    }

    async fn on_answer(
        &mut self,
        from: &str,
        answer: SessionDescription,
        candidates: Vec<IceCandidateInit>,
        effects: &mut Vec<PeerEffect>,
    ) {
        let Some(link) = self.links.get_mut(from) else {
            warn!(participant_id = %from, "Answer from unknown peer, ignoring");
            return;
        };
        if link.role == Role::Responder {
            warn!(participant_id = %from, "Answer reached a responder link, ignoring");
            return;
        }

        let result = match link.state {
            ConnectionState::Offering => {
                let applied = apply_remote(link, answer, candidates).await;
                if applied.is_ok() {
                    transition(link, ConnectionState::Connecting, None, effects);
                }
                applied
            }
            ConnectionState::Connected | ConnectionState::Disconnected => {
                debug!(participant_id = %from, "Applying ICE restart answer");
                apply_remote(link, answer, candidates).await
            }
            state => {
                warn!(participant_id = %from, state = %state, "Unexpected answer, ignoring");
                Ok(())
            }
        };

        if let Err(e) = result {
            effects.extend(self.fail(from, e.to_string(), false).await);
        }
    }

    async fn on_remote_candidate(
        &mut self,
        from: &str,
        candidate: IceCandidateInit,
        effects: &mut Vec<PeerEffect>,
    ) {
        let Some(link) = self.links.get_mut(from) else {
            debug!(participant_id = %from, "Candidate for unknown peer, ignoring");
            return;
        };
        if !link.remote_description_set {
            link.pending_candidates.push_back(candidate);
            debug!(
                participant_id = %from,
                queued = link.pending_candidates.len(),
                "Queued candidate until remote description is set"
            );
            return;
        }
        if let Err(e) = link.connection.add_ice_candidate(candidate).await {
            effects.extend(self.fail(from, e.to_string(), false).await);
        }
    }

    // -----------------------------------------------------------------------
    // Engine and timer input
    // -----------------------------------------------------------------------

    pub async fn handle_engine(&mut self, participant_id: &str, epoch: u64, event: EngineEvent) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        let Some(link) = self.links.get_mut(participant_id) else {
            debug!(participant_id = %participant_id, "Engine event for closed link");
            return effects;
        };
        if link.epoch != epoch {
            debug!(participant_id = %participant_id, epoch, current = link.epoch, "Stale engine event");
            return effects;
        }

        let mut failure = None;
        match event {
            EngineEvent::IceCandidate(candidate) => {
                if link.outgoing.is_some() {
                    link.gathered.push(candidate);
                } else {
                    effects.push(PeerEffect::Send(SignalingMessage::IceCandidate {
                        from_participant: self.local_id.clone(),
                        to_participant: participant_id.to_string(),
                        candidate,
                    }));
                }
            }
            EngineEvent::GatheringComplete => {
                flush_outgoing(&self.local_id, link, &mut effects);
            }
            EngineEvent::TransportStateChanged(state) => match state {
                TransportState::Connected => {
                    if link.state != ConnectionState::Connected
                        && link.state.can_transition_to(ConnectionState::Connected)
                    {
                        link.retry_count = 0;
                        transition(link, ConnectionState::Connected, None, &mut effects);
                        if link.data_channel_open {
                            effects.push(side_channel(participant_id, true));
                        }
                    }
                }
                TransportState::Disconnected => {
                    if matches!(link.state, ConnectionState::Connected | ConnectionState::Connecting) {
                        let was_ready = link.side_channel_ready();
                        transition(link, ConnectionState::Disconnected, None, &mut effects);
                        if was_ready {
                            effects.push(side_channel(participant_id, false));
                        }
                    }
                }
                TransportState::Failed => failure = Some("ICE transport failed".to_string()),
                TransportState::Closed => failure = Some("transport closed by remote".to_string()),
                TransportState::New | TransportState::Checking => {}
            },
            EngineEvent::RemoteStream(stream) => {
                link.remote_stream = Some(stream.clone());
                effects.push(PeerEffect::RemoteStream {
                    participant_id: participant_id.to_string(),
                    stream,
                });
            }
            EngineEvent::DataChannelOpen => {
                link.data_channel_open = true;
                if link.side_channel_ready() {
                    effects.push(side_channel(participant_id, true));
                }
            }
            EngineEvent::DataChannelClosed => {
                let was_ready = link.side_channel_ready();
                link.data_channel_open = false;
                if was_ready {
                    effects.push(side_channel(participant_id, false));
                }
            }
            EngineEvent::DataMessage(text) => effects.push(PeerEffect::DataMessage {
                participant_id: participant_id.to_string(),
                text,
            }),
            EngineEvent::Stats(stats) => effects.push(PeerEffect::Stats {
                participant_id: participant_id.to_string(),
                stats,
            }),
        }

        if let Some(reason) = failure {
            effects.extend(self.fail(participant_id, reason, true).await);
        }
        effects
    }

    /// The gathering grace period ran out: send what was gathered so far.
    pub fn on_gathering_timeout(&mut self, participant_id: &str, epoch: u64) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        if let Some(link) = self.links.get_mut(participant_id) {
            if link.epoch == epoch && link.outgoing.is_some() {
                debug!(
                    participant_id = %participant_id,
                    gathered = link.gathered.len(),
                    "ICE gathering grace elapsed"
                );
                flush_outgoing(&self.local_id, link, &mut effects);
            }
        }
        effects
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// ICE-restart re-offer from an established initiator link.
    pub async fn reoffer(&mut self, participant_id: &str) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        let Some(link) = self.links.get_mut(participant_id) else {
            return effects;
        };
        if link.role != Role::Initiator
            || !matches!(link.state, ConnectionState::Connected | ConnectionState::Disconnected)
        {
            return effects;
        }
        link.retry_count += 1;
        info!(
            participant_id = %participant_id,
            retry = link.retry_count,
            cid = %link.correlation_id,
            "Re-offering with ICE restart"
        );
        let result = link.connection.create_offer(true).await;
        match result {
            Ok(offer) => effects.push(PeerEffect::Send(SignalingMessage::Offer {
                from_participant: self.local_id.clone(),
                to_participant: participant_id.to_string(),
                offer,
                candidates: Vec::new(),
            })),
            Err(e) => effects.extend(self.fail(participant_id, e.to_string(), false).await),
        }
        effects
    }

    /// Signaling came back after a gap: in-flight offers and answers are
    /// lost. Initiators that never connected start over, responders that
    /// were mid-answer go back to waiting.
    pub async fn restart_after_signaling_gap(&mut self) -> Vec<PeerEffect> {
        let stalled: Vec<(String, Role, Option<LocalStream>, u32)> = self
            .links
            .values()
            .filter(|l| match l.role {
                Role::Initiator => matches!(
                    l.state,
                    ConnectionState::New
                        | ConnectionState::Gathering
                        | ConnectionState::Offering
                        | ConnectionState::Connecting
                ),
                Role::Responder => {
                    matches!(l.state, ConnectionState::Answering | ConnectionState::Connecting)
                }
            })
            .map(|l| (l.participant_id.clone(), l.role, l.local_stream.clone(), l.retry_count))
            .collect();

        let mut effects = Vec::new();
        for (id, role, stream, retry_count) in stalled {
            info!(participant_id = %id, role = ?role, "Restarting negotiation after signaling gap");
            effects.extend(self.add_peer(&id, role, stream, retry_count).await);
        }
        effects
    }

    // -----------------------------------------------------------------------
    // Media and data
    // -----------------------------------------------------------------------

    pub async fn send_data(&mut self, participant_id: &str, text: &str) -> Result<(), EngineError> {
        let link = self
            .links
            .get_mut(participant_id)
            .ok_or(EngineError::DataChannelClosed)?;
        if !link.side_channel_ready() {
            return Err(EngineError::DataChannelClosed);
        }
        link.connection.send_data(text).await
    }

    /// Start or stop sending a screen stream on every link.
    pub async fn set_screen_stream(&mut self, screen: Option<LocalStream>) -> Vec<PeerEffect> {
        let mut effects = Vec::new();
        self.screen = screen.clone();
        for id in self.ids() {
            let Some(link) = self.links.get_mut(&id) else {
                continue;
            };
            let result = match (&screen, link.screen_stream.take()) {
                (Some(next), previous) => {
                    if let Some(previous) = previous {
                        let _ = link.connection.detach_local_stream(previous.handle()).await;
                    }
                    let attached = link.connection.attach_local_stream(next.handle()).await;
                    if attached.is_ok() {
                        link.screen_stream = Some(next.clone());
                    }
                    attached
                }
                (None, Some(previous)) => link.connection.detach_local_stream(previous.handle()).await,
                (None, None) => Ok(()),
            };
            if let Err(e) = result {
                effects.extend(self.fail(&id, e.to_string(), false).await);
            }
        }
        effects
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn transition(
    link: &mut PeerLink,
    next: ConnectionState,
    reason: Option<String>,
    effects: &mut Vec<PeerEffect>,
) {
    if !link.state.can_transition_to(next) {
        warn!(
            participant_id = %link.participant_id,
            from = %link.state,
            to = %next,
            "Rejected state transition"
        );
        return;
    }
    debug!(
        participant_id = %link.participant_id,
        cid = %link.correlation_id,
        from = %link.state,
        to = %next,
        "Peer state"
    );
    link.state = next;
    effects.push(PeerEffect::StateChanged {
        participant_id: link.participant_id.clone(),
        state: next,
        reason,
    });
}

fn side_channel(participant_id: &str, ready: bool) -> PeerEffect {
    PeerEffect::SideChannelReady {
        participant_id: participant_id.to_string(),
        ready,
    }
}

/// Send the held-back local description with everything gathered so far.
fn flush_outgoing(local_id: &str, link: &mut PeerLink, effects: &mut Vec<PeerEffect>) {
    let Some(description) = link.outgoing.take() else {
        return;
    };
    link.cancel_gathering_timer();
    let candidates = std::mem::take(&mut link.gathered);
    debug!(
        participant_id = %link.participant_id,
        kind = %description.kind,
        candidates = candidates.len(),
        "Sending local description"
    );
    let to_participant = link.participant_id.clone();
    match description.kind {
        SdpType::Offer => {
            transition(link, ConnectionState::Offering, None, effects);
            effects.push(PeerEffect::Send(SignalingMessage::Offer {
                from_participant: local_id.to_string(),
                to_participant,
                offer: description,
                candidates,
            }));
        }
        SdpType::Answer => {
            effects.push(PeerEffect::Send(SignalingMessage::Answer {
                from_participant: local_id.to_string(),
                to_participant,
                answer: description,
                candidates,
            }));
            transition(link, ConnectionState::Connecting, None, effects);
        }
    }
}

async fn apply_remote(
    link: &mut PeerLink,
    description: SessionDescription,
    bundled: Vec<IceCandidateInit>,
) -> Result<(), EngineError> {
    link.connection.set_remote_description(description).await?;
    link.remote_description_set = true;
    flush_candidates(link, bundled).await
}

/// Apply queued candidates in arrival order, then the ones bundled with
/// the description.
async fn flush_candidates(link: &mut PeerLink, bundled: Vec<IceCandidateInit>) -> Result<(), EngineError> {
    if !link.pending_candidates.is_empty() {
        debug!(
            participant_id = %link.participant_id,
            count = link.pending_candidates.len(),
            "Flushing queued candidates"
        );
    }
    while let Some(candidate) = link.pending_candidates.pop_front() {
        link.connection.add_ice_candidate(candidate).await?;
    }
    for candidate in bundled {
        link.connection.add_ice_candidate(candidate).await?;
    }
    Ok(())
}

async fn shutdown(mut link: PeerLink) {
    link.cancel_gathering_timer();
    link.connection.close().await;
}

#[cfg(test)]
mod tests;
