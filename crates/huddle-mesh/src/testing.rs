//! In-process fakes for the external collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::{EngineError, MediaError, SignalingError};
use crate::media::{MediaConstraints, MediaSource, StreamHandle, StreamKind};
use crate::peer::{ConnectionOptions, EngineEvent, EngineEventSink, RtcConnection, RtcEngine, TransportState};
use crate::protocol::{IceCandidateInit, ParticipantInfo, SessionDescription, SignalingMessage};
use crate::session::TransportFactory;
use crate::signaling::{Announce, ManualExchange, SignalingEvent, SignalingTransport, TransportMode};

// ---------------------------------------------------------------------------
// RTC engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineOp {
    Created { negotiate_data_channel: bool },
    Attach(StreamHandle),
    Detach(StreamHandle),
    CreateOffer { ice_restart: bool },
    CreateAnswer,
    SetRemote(SessionDescription),
    AddCandidate(String),
    SendData(String),
    Close,
}

#[derive(Default)]
struct EngineState {
    ops: Vec<(String, EngineOp)>,
    sinks: HashMap<String, EngineEventSink>,
    descriptions: u32,
}

/// Records every call and, unless silent, reports one host candidate and
/// gathering completion after each local description.
#[derive(Clone, Default)]
pub(crate) struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
    silent: bool,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Never finishes gathering on its own.
    pub(crate) fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub(crate) fn ops(&self, participant_id: &str) -> Vec<EngineOp> {
        let state = self.state.lock().unwrap();
        state
            .ops
            .iter()
            .filter(|(id, _)| id == participant_id)
            .map(|(_, op)| op.clone())
            .collect()
    }

    pub(crate) fn added_candidates(&self, participant_id: &str) -> Vec<String> {
        self.ops(participant_id)
            .into_iter()
            .filter_map(|op| match op {
                EngineOp::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sent_data(&self, participant_id: &str) -> Vec<String> {
        self.ops(participant_id)
            .into_iter()
            .filter_map(|op| match op {
                EngineOp::SendData(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Deliver a callback on the newest connection to `participant_id`.
    pub(crate) fn emit(&self, participant_id: &str, event: EngineEvent) -> bool {
        let state = self.state.lock().unwrap();
        state
            .sinks
            .get(participant_id)
            .is_some_and(|sink| sink.emit(event))
    }

    /// Transport up, data channel open, remote media flowing.
    pub(crate) fn establish(&self, participant_id: &str) {
        self.emit(participant_id, EngineEvent::TransportStateChanged(TransportState::Connected));
        self.emit(participant_id, EngineEvent::DataChannelOpen);
        self.emit(
            participant_id,
            EngineEvent::RemoteStream(StreamHandle::new(format!("remote-{participant_id}"), StreamKind::Camera)),
        );
    }
}

impl RtcEngine for FakeEngine {
    fn create_connection(
        &self,
        participant_id: &str,
        options: &ConnectionOptions,
        sink: EngineEventSink,
    ) -> Result<Box<dyn RtcConnection>, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push((
            participant_id.to_string(),
            EngineOp::Created {
                negotiate_data_channel: options.negotiate_data_channel,
            },
        ));
        state.sinks.insert(participant_id.to_string(), sink.clone());
        Ok(Box::new(FakeConnection {
            participant_id: participant_id.to_string(),
            sink,
            state: Arc::clone(&self.state),
            silent: self.silent,
        }))
    }
}

struct FakeConnection {
    participant_id: String,
    sink: EngineEventSink,
    state: Arc<Mutex<EngineState>>,
    silent: bool,
}

impl FakeConnection {
    fn record(&self, op: EngineOp) {
        self.state
            .lock()
            .unwrap()
            .ops
            .push((self.participant_id.clone(), op));
    }

    fn next_description(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.descriptions += 1;
        state.descriptions
    }

    fn gather(&self, n: u32) {
        if self.silent {
            return;
        }
        let candidate = format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host");
        self.sink
            .emit(EngineEvent::IceCandidate(IceCandidateInit::new(candidate)));
        self.sink.emit(EngineEvent::GatheringComplete);
    }
}

#[async_trait]
impl RtcConnection for FakeConnection {
    async fn attach_local_stream(&mut self, stream: &StreamHandle) -> Result<(), EngineError> {
        self.record(EngineOp::Attach(stream.clone()));
        Ok(())
    }

    async fn detach_local_stream(&mut self, stream: &StreamHandle) -> Result<(), EngineError> {
        self.record(EngineOp::Detach(stream.clone()));
        Ok(())
    }

    async fn create_offer(&mut self, ice_restart: bool) -> Result<SessionDescription, EngineError> {
        self.record(EngineOp::CreateOffer { ice_restart });
        let n = self.next_description();
        self.gather(n);
        Ok(SessionDescription::offer(format!("v=0 offer-{n} for {}", self.participant_id)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, EngineError> {
        self.record(EngineOp::CreateAnswer);
        let n = self.next_description();
        self.gather(n);
        Ok(SessionDescription::answer(format!("v=0 answer-{n} for {}", self.participant_id)))
    }

    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<(), EngineError> {
        if description.sdp.contains("bogus") {
            return Err(EngineError::InvalidDescription("unparseable sdp".into()));
        }
        self.record(EngineOp::SetRemote(description));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidateInit) -> Result<(), EngineError> {
        if candidate.candidate.contains("bogus") {
            return Err(EngineError::InvalidCandidate(candidate.candidate));
        }
        self.record(EngineOp::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn send_data(&mut self, text: &str) -> Result<(), EngineError> {
        self.record(EngineOp::SendData(text.to_string()));
        Ok(())
    }

    async fn close(&mut self) {
        self.record(EngineOp::Close);
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeMedia {
    captured: AtomicU32,
    deny: AtomicBool,
    stopped: Mutex<Vec<StreamHandle>>,
}

impl FakeMedia {
    pub(crate) fn denying() -> Self {
        let media = Self::default();
        media.deny.store(true, Ordering::SeqCst);
        media
    }

    pub(crate) fn stopped(&self) -> Vec<StreamHandle> {
        self.stopped.lock().unwrap().clone()
    }

    fn next(&self, kind: StreamKind) -> Result<StreamHandle, MediaError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("camera blocked by user".into()));
        }
        let n = self.captured.fetch_add(1, Ordering::SeqCst) + 1;
        let prefix = match kind {
            StreamKind::Camera => "camera",
            StreamKind::Screen => "screen",
        };
        Ok(StreamHandle::new(format!("{prefix}-{n}"), kind))
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn capture(&self, _constraints: MediaConstraints) -> Result<StreamHandle, MediaError> {
        self.next(StreamKind::Camera)
    }

    async fn capture_screen(&self) -> Result<StreamHandle, MediaError> {
        self.next(StreamKind::Screen)
    }

    fn stop(&self, handle: &StreamHandle) {
        self.stopped.lock().unwrap().push(handle.clone());
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

struct HubMember {
    room_id: String,
    info: ParticipantInfo,
    events: mpsc::UnboundedSender<SignalingEvent>,
}

#[derive(Default)]
struct HubState {
    members: HashMap<String, HubMember>,
    log: Vec<SignalingMessage>,
}

impl HubState {
    fn deliver(&self, to: &str, message: SignalingMessage) {
        if let Some(member) = self.members.get(to) {
            let _ = member.events.send(SignalingEvent::Message(message));
        }
    }

    fn peers_of(&self, participant_id: &str) -> Vec<String> {
        let Some(me) = self.members.get(participant_id) else {
            return Vec::new();
        };
        self.members
            .iter()
            .filter(|(id, m)| id.as_str() != participant_id && m.room_id == me.room_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// What the relay does on join: roster to the joiner, announcement to
    /// everyone else.
    fn announce(&self, participant_id: &str) {
        let Some(me) = self.members.get(participant_id) else {
            return;
        };
        let peers = self.peers_of(participant_id);
        let participants = peers
            .iter()
            .filter_map(|id| self.members.get(id).map(|m| m.info.clone()))
            .collect();
        self.deliver(participant_id, SignalingMessage::RoomParticipants { participants });
        for peer in peers {
            self.deliver(
                &peer,
                SignalingMessage::ParticipantJoined {
                    participant_id: participant_id.to_string(),
                    participant_name: me.info.participant_name.clone(),
                    is_host: me.info.is_host,
                    timestamp: Utc::now(),
                },
            );
        }
    }
}

/// In-process relay with the routing rules of the real one.
#[derive(Clone, Default)]
pub(crate) struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every message the hub routed, senders stamped.
    pub(crate) fn log(&self) -> Vec<SignalingMessage> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn offers_from(&self, participant_id: &str) -> usize {
        self.log()
            .iter()
            .filter(|m| m.kind() == "offer" && m.sender() == Some(participant_id))
            .count()
    }

    /// Announce a member to its room again without touching its connection.
    pub(crate) fn repeat_join(&self, participant_id: &str) {
        self.state.lock().unwrap().announce(participant_id);
    }

    /// Drop and restore one member's relay connection, as the real relay
    /// client would experience it.
    pub(crate) fn bounce(&self, participant_id: &str) {
        let state = self.state.lock().unwrap();
        if let Some(member) = state.members.get(participant_id) {
            let _ = member.events.send(SignalingEvent::Disconnected);
            let _ = member.events.send(SignalingEvent::Reconnected);
        }
        state.announce(participant_id);
    }
}

impl TransportFactory for LoopbackHub {
    fn create(&self, mode: TransportMode) -> Box<dyn SignalingTransport> {
        match mode {
            TransportMode::Relay => Box::new(HubTransport {
                hub: self.clone(),
                participant_id: None,
            }),
            TransportMode::Manual => Box::new(ManualExchange::new()),
        }
    }
}

struct HubTransport {
    hub: LoopbackHub,
    participant_id: Option<String>,
}

#[async_trait]
impl SignalingTransport for HubTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }

    async fn connect(
        &mut self,
        announce: Announce,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<(), SignalingError> {
        let mut state = self.hub.state.lock().unwrap();
        let _ = events.send(SignalingEvent::Connected);
        state.members.insert(
            announce.participant_id.clone(),
            HubMember {
                room_id: announce.room_id.clone(),
                info: ParticipantInfo {
                    participant_id: announce.participant_id.clone(),
                    participant_name: announce.participant_name.clone(),
                    is_host: announce.is_host,
                    audio_enabled: true,
                    video_enabled: true,
                    screen_sharing: false,
                    hand_raised: false,
                },
                events,
            },
        );
        state.announce(&announce.participant_id);
        self.participant_id = Some(announce.participant_id);
        Ok(())
    }

    async fn send(&mut self, mut message: SignalingMessage) -> Result<(), SignalingError> {
        let me = self.participant_id.as_deref().ok_or(SignalingError::Closed)?;
        let mut state = self.hub.state.lock().unwrap();
        message.set_sender(me);
        state.log.push(message.clone());
        match message.recipient().map(str::to_string) {
            Some(to) => state.deliver(&to, message),
            None => {
                for peer in state.peers_of(me) {
                    state.deliver(&peer, message.clone());
                }
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        let Some(me) = self.participant_id.take() else {
            return;
        };
        let mut state = self.hub.state.lock().unwrap();
        let peers = state.peers_of(&me);
        if let Some(member) = state.members.remove(&me) {
            let _ = member.events.send(SignalingEvent::Closed);
        }
        for peer in peers {
            state.deliver(
                &peer,
                SignalingMessage::ParticipantLeft {
                    participant_id: me.clone(),
                    timestamp: Utc::now(),
                },
            );
        }
    }
}
