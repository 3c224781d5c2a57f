//! The session loop.
//!
//! One task owns the registry, the peer manager, the supervisor and the
//! signaling transport. Commands, signaling events, engine callbacks,
//! timers and roster polls are drawn one at a time and handled to
//! completion, so no handler ever observes another one half-way.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{
    MeshOptions, NewRoom, ParticipantChange, SessionCommand, SessionDeps, SessionEvent, SessionInput,
    SessionSnapshot, SignalingStatus, TimerKind,
};
use crate::error::{RoomError, SessionError, SideChannelError, SignalingError};
use crate::media::{LocalStream, MediaConstraints, StreamHandle};
use crate::peer::{ConnectionState, PeerEffect, PeerManager, Role};
use crate::protocol::{SdpType, SignalingMessage};
use crate::registry::{
    connection_quality, CreateRoomRequest, JoinRoomRequest, LocalRoomService, Participant, ParticipantFlag,
    ParticipantRole, Registry, Room, RoomService, RoomSettings,
};
use crate::side_channel::{plan_route, DeliveryReport, Relayed, SideChannelBus, SideMessage, SidePayload};
use crate::signaling::{render_qr, Announce, SignalingEvent, SignalingTransport, TransportMode, MANUAL_PEER_ID};
use crate::supervisor::{ReconnectionSupervisor, Recovery};

pub(crate) struct SessionDriver {
    deps: SessionDeps,
    options: MeshOptions,
    /// Backs manual-mode rooms, which never reach the room service.
    manual_rooms: Arc<dyn RoomService>,
    registry: Registry,
    manager: PeerManager,
    supervisor: ReconnectionSupervisor,
    transport: Option<Box<dyn SignalingTransport>>,
    mode: Option<TransportMode>,
    side: SideChannelBus,
    /// The preview's hold on the camera stream.
    camera: Option<LocalStream>,
    screen: Option<LocalStream>,
    poll_task: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    /// Replaced on every room entry so a previous transport cannot leak in.
    signals: Option<mpsc::UnboundedReceiver<SignalingEvent>>,
}

impl SessionDriver {
    pub(crate) fn new(
        deps: SessionDeps,
        options: MeshOptions,
        side: SideChannelBus,
        commands: mpsc::Receiver<SessionCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let manager = PeerManager::new(Arc::clone(&deps.engine), options.peer_options(), inputs_tx.clone());
        let supervisor = ReconnectionSupervisor::new(options.supervisor_options(), inputs_tx.clone());
        let manual_rooms: Arc<dyn RoomService> = Arc::new(LocalRoomService::new(options.room_expiry_hours));
        Self {
            deps,
            options,
            manual_rooms,
            registry: Registry::new(),
            manager,
            supervisor,
            transport: None,
            mode: None,
            side,
            camera: None,
            screen: None,
            poll_task: None,
            events,
            commands,
            inputs_tx,
            inputs,
            signals: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Session loop started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(input) = self.inputs.recv() => self.handle_input(input).await,
                event = next_signal(&mut self.signals) => match event {
                    Some(event) => self.handle_signaling(event).await,
                    None => self.signals = None,
                },
            }
        }
        if let Err(e) = self.leave_room().await {
            warn!(error = %e, "Leaving room on shutdown failed");
        }
        debug!("Session loop stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn rooms_for(&self, mode: TransportMode) -> Arc<dyn RoomService> {
        match mode {
            TransportMode::Relay => Arc::clone(&self.deps.rooms),
            TransportMode::Manual => Arc::clone(&self.manual_rooms),
        }
    }

    /// Stream a new link should send: the preview's, or any link's once the
    /// preview is released.
    fn camera_for_link(&self) -> Option<LocalStream> {
        self.camera
            .clone()
            .or_else(|| self.manager.shared_local_stream())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::CreateRoom { request, reply } => {
                let _ = reply.send(self.create_room(request).await);
            }
            SessionCommand::JoinRoom { request, reply } => {
                let _ = reply.send(self.join_room(request).await);
            }
            SessionCommand::StartManualHost { display_name, reply } => {
                let _ = reply.send(self.start_manual(display_name, true).await);
            }
            SessionCommand::StartManualGuest { display_name, reply } => {
                let _ = reply.send(self.start_manual(display_name, false).await);
            }
            SessionCommand::PasteExchangeCode { code, reply } => {
                let _ = reply.send(self.paste_exchange_code(&code).await);
            }
            SessionCommand::LeaveRoom { reply } => {
                let _ = reply.send(self.leave_room().await);
            }
            SessionCommand::HangUp { participant_id, reply } => {
                let _ = reply.send(Ok(self.remove_peer(&participant_id, "hung up").await));
            }
            SessionCommand::SetFlag { flag, value, reply } => {
                let _ = reply.send(self.update_local_flag(flag, value).await);
            }
            SessionCommand::StartScreenShare { reply } => {
                let _ = reply.send(self.start_screen_share().await);
            }
            SessionCommand::StopScreenShare { reply } => {
                let _ = reply.send(self.stop_screen_share().await);
            }
            SessionCommand::SetLocked { locked, reply } => {
                let _ = reply.send(self.set_locked(locked).await);
            }
            SessionCommand::Post { payload, reply } => {
                let _ = reply.send(self.post(payload).await);
            }
            SessionCommand::ReleasePreview { reply } => {
                let released = self.camera.take().is_some();
                if released {
                    debug!("Local preview released");
                }
                let _ = reply.send(released);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn capture(&self, constraints: MediaConstraints) -> Result<LocalStream, SessionError> {
        let handle = self.deps.media.capture(constraints).await.map_err(|e| {
            warn!(error = %e, "Local media capture failed");
            e
        })?;
        Ok(LocalStream::new(handle, Arc::clone(&self.deps.media)))
    }

    async fn create_room(&mut self, request: NewRoom) -> Result<Room, SessionError> {
        if self.registry.is_in_room() {
            return Err(SessionError::AlreadyInRoom);
        }
        let mut settings = request.settings.clone();
        if let Some(password) = &request.password {
            settings = settings.with_password(password);
        }
        // No room is created when capture is refused.
        let camera = self.capture(MediaConstraints::from(&settings)).await?;

        let host_id = request.user_id.clone().unwrap_or_else(huddle_common::new_id);
        let rooms = self.rooms_for(TransportMode::Relay);
        let room = rooms
            .create(CreateRoomRequest {
                name: request.name,
                host_id: host_id.clone(),
                max_participants: request.max_participants.unwrap_or(self.options.max_participants),
                settings,
            })
            .await?;
        let (room, local) = rooms
            .join(JoinRoomRequest {
                access_code: room.access_code.clone(),
                display_name: request.display_name,
                user_id: Some(host_id),
                password: request.password,
            })
            .await?;
        self.enter(room, local, TransportMode::Relay, camera).await
    }

    async fn join_room(&mut self, request: JoinRoomRequest) -> Result<Room, SessionError> {
        if self.registry.is_in_room() {
            return Err(SessionError::AlreadyInRoom);
        }
        let rooms = self.rooms_for(TransportMode::Relay);
        let (room, local) = rooms.join(request).await?;
        let camera = match self.capture(MediaConstraints::from(&room.settings)).await {
            Ok(camera) => camera,
            Err(e) => {
                if let Err(leave_err) = rooms.leave(&room.id, &local.participant_id).await {
                    warn!(error = %leave_err, "Failed to give back room seat");
                }
                return Err(e);
            }
        };
        self.enter(room, local, TransportMode::Relay, camera).await
    }

    /// Relay-less two-party session. The host offers first; the guest's
    /// link appears when the host's code is pasted.
    async fn start_manual(&mut self, display_name: String, host: bool) -> Result<Room, SessionError> {
        if self.registry.is_in_room() {
            return Err(SessionError::AlreadyInRoom);
        }
        let settings = RoomSettings::default();
        let camera = self.capture(MediaConstraints::from(&settings)).await?;

        let rooms = self.rooms_for(TransportMode::Manual);
        let owner_id = huddle_common::new_id();
        let room = rooms
            .create(CreateRoomRequest {
                name: format!("{display_name} (manual)"),
                host_id: owner_id.clone(),
                max_participants: 2,
                settings,
            })
            .await?;
        let (room, local) = rooms
            .join(JoinRoomRequest {
                access_code: room.access_code.clone(),
                display_name,
                user_id: host.then_some(owner_id),
                password: None,
            })
            .await?;
        let room = self.enter(room, local, TransportMode::Manual, camera).await?;

        if host {
            let guest = Participant::new(MANUAL_PEER_ID, "Guest", ParticipantRole::Participant);
            self.add_remote(guest);
            let effects = self
                .manager
                .add_peer(MANUAL_PEER_ID, Role::Initiator, self.camera_for_link(), 0)
                .await;
            self.apply(effects).await;
        }
        Ok(room)
    }

    async fn enter(
        &mut self,
        room: Room,
        local: Participant,
        mode: TransportMode,
        camera: LocalStream,
    ) -> Result<Room, SessionError> {
        let announce = Announce {
            room_id: room.id.clone(),
            participant_id: local.participant_id.clone(),
            participant_name: local.display_name.clone(),
            is_host: local.is_host(),
        };
        let mut transport = self.deps.transports.create(mode);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        if let Err(e) = transport.connect(announce, signal_tx).await {
            warn!(room_id = %room.id, error = %e, "Signaling connect failed");
            if let Err(leave_err) = self.rooms_for(mode).leave(&room.id, &local.participant_id).await {
                warn!(error = %leave_err, "Failed to give back room seat");
            }
            return Err(e.into());
        }

        self.registry.enter_room(room.clone(), local.clone());
        self.manager.set_local_id(&local.participant_id);
        self.supervisor.set_auto_reoffer(mode == TransportMode::Relay);
        self.transport = Some(transport);
        self.signals = Some(signal_rx);
        self.mode = Some(mode);
        self.camera = Some(camera);
        if mode == TransportMode::Relay {
            self.start_roster_poll(&room.id);
        }

        info!(
            room_id = %room.id,
            participant_id = %local.participant_id,
            mode = mode.as_str(),
            "Entered room"
        );
        self.emit(SessionEvent::RoomEntered {
            room: room.clone(),
            local,
            mode,
        });
        Ok(room)
    }

    async fn paste_exchange_code(&mut self, code: &str) -> Result<(), SessionError> {
        if self.mode != Some(TransportMode::Manual) {
            return Err(SessionError::WrongMode("manual"));
        }
        let is_host = self.registry.local().is_some_and(Participant::is_host);
        let expect = match self.manager.role(MANUAL_PEER_ID) {
            Some(Role::Initiator) => SdpType::Answer,
            Some(Role::Responder) => return Err(SessionError::ManualPeerExists),
            None if is_host => return Err(SessionError::NoManualPeer),
            None => {
                let host = Participant::new(MANUAL_PEER_ID, "Host", ParticipantRole::Host);
                self.add_remote(host);
                let effects = self
                    .manager
                    .add_peer(MANUAL_PEER_ID, Role::Responder, self.camera_for_link(), 0)
                    .await;
                self.apply(effects).await;
                if !self.manager.contains(MANUAL_PEER_ID) {
                    return Err(SessionError::NoManualPeer);
                }
                SdpType::Offer
            }
        };

        let transport = self.transport.as_mut().ok_or(SessionError::NotInRoom)?;
        match transport.accept_exchange_code(code, expect).await {
            Ok(()) => Ok(()),
            Err(SignalingError::ExchangeCode(e)) => {
                warn!(expected = %expect, error = %e, "Rejected exchange code");
                // The guest's link exists only for this code; the host's
                // offer is still good and keeps waiting for a valid answer.
                if expect == SdpType::Offer {
                    let effects = self
                        .manager
                        .fail(MANUAL_PEER_ID, format!("invalid exchange code: {e}"), false)
                        .await;
                    self.apply(effects).await;
                }
                Err(SessionError::ExchangeCode(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tear everything down. A second call finds nothing and returns
    /// `Ok(false)`.
    async fn leave_room(&mut self) -> Result<bool, SessionError> {
        let Some(room) = self.registry.room().cloned() else {
            return Ok(false);
        };
        let local_id = self.registry.local_id().map(str::to_string);
        let mode = self.mode.take();

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.supervisor.cancel_all();
        for effect in self.manager.close_all().await {
            if let PeerEffect::StateChanged {
                participant_id,
                state,
                reason,
            } = effect
            {
                self.emit(SessionEvent::ConnectionStateChanged {
                    participant_id,
                    state,
                    reason,
                });
            }
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.signals = None;

        if let (Some(mode), Some(local_id)) = (mode, local_id) {
            if let Err(e) = self.rooms_for(mode).leave(&room.id, &local_id).await {
                warn!(room_id = %room.id, error = %e, "Room service leave failed");
            }
        }
        self.registry.leave_room();
        self.screen = None;
        self.camera = None;

        info!(room_id = %room.id, "Left room");
        self.emit(SessionEvent::RoomLeft { room_id: room.id });
        Ok(true)
    }

    async fn update_local_flag(&mut self, flag: ParticipantFlag, value: bool) -> Result<Participant, SessionError> {
        let room_id = self.registry.room().map(|r| r.id.clone()).ok_or(SessionError::NotInRoom)?;
        let local_id = self.registry.local_id().map(str::to_string).ok_or(SessionError::NotInRoom)?;
        let mode = self.mode.ok_or(SessionError::NotInRoom)?;

        self.rooms_for(mode)
            .set_participant_flag(&room_id, &local_id, flag, value)
            .await?;

        if let Some(local) = self.registry.set_local_flag(flag, value) {
            debug!(flag = ?flag, value, "Local flag changed");
            self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Updated(local.clone())));
            self.send_signal(SignalingMessage::ParticipantUpdated {
                participant_id: local.participant_id.clone(),
                audio_enabled: local.audio_enabled,
                video_enabled: local.video_enabled,
                screen_sharing: local.screen_sharing,
                hand_raised: local.hand_raised,
                timestamp: Utc::now(),
            })
            .await;
        }
        self.registry.local().cloned().ok_or(SessionError::NotInRoom)
    }

    async fn start_screen_share(&mut self) -> Result<StreamHandle, SessionError> {
        let room = self.registry.room().ok_or(SessionError::NotInRoom)?;
        if !room.settings.allow_screen_share {
            return Err(RoomError::ScreenShareDisabled.into());
        }
        if let Some(screen) = &self.screen {
            return Ok(screen.handle().clone());
        }

        let handle = self.deps.media.capture_screen().await?;
        let screen = LocalStream::new(handle.clone(), Arc::clone(&self.deps.media));
        self.update_local_flag(ParticipantFlag::ScreenShare, true).await?;

        let effects = self.manager.set_screen_stream(Some(screen.clone())).await;
        self.screen = Some(screen);
        self.apply(effects).await;
        info!(stream_id = %handle.id, "Screen share started");
        Ok(handle)
    }

    async fn stop_screen_share(&mut self) -> Result<bool, SessionError> {
        if self.screen.is_none() {
            return Ok(false);
        }
        let effects = self.manager.set_screen_stream(None).await;
        self.screen = None;
        self.apply(effects).await;
        self.update_local_flag(ParticipantFlag::ScreenShare, false).await?;
        info!("Screen share stopped");
        Ok(true)
    }

    async fn set_locked(&mut self, locked: bool) -> Result<Room, SessionError> {
        let room_id = self.registry.room().map(|r| r.id.clone()).ok_or(SessionError::NotInRoom)?;
        if !self.registry.local().is_some_and(Participant::is_host) {
            return Err(RoomError::NotHost.into());
        }
        let mode = self.mode.ok_or(SessionError::NotInRoom)?;
        self.rooms_for(mode).set_locked(&room_id, locked).await?;
        if self.registry.set_locked(locked) {
            info!(room_id = %room_id, locked, "Room lock changed");
            if let Some(room) = self.registry.room().cloned() {
                self.emit(SessionEvent::RoomUpdated(room));
            }
        }
        self.registry.room().cloned().ok_or(SessionError::NotInRoom)
    }

    /// Post one side message to every remote participant and echo it to
    /// local subscribers.
    async fn post(&mut self, payload: SidePayload) -> Result<DeliveryReport, SessionError> {
        let (room, local) = match (self.registry.room(), self.registry.local()) {
            (Some(room), Some(local)) => (room, local),
            _ => return Err(SideChannelError::NotInRoom.into()),
        };
        if matches!(payload, SidePayload::Chat { .. }) && !room.settings.allow_chat {
            return Err(SideChannelError::ChatDisabled.into());
        }
        let mode = self.mode.ok_or(SideChannelError::NotInRoom)?;
        let message = SideMessage::new(local.participant_id.clone(), local.display_name.clone(), payload);

        let peers: Vec<(String, bool)> = self
            .registry
            .remote_ids()
            .into_iter()
            .map(|id| {
                let ready = self.manager.is_side_channel_ready(&id);
                (id, ready)
            })
            .collect();
        let plan = plan_route(&peers, mode)?;

        let mut report = DeliveryReport::default();
        let mut fallback = Vec::new();
        if !plan.direct.is_empty() {
            let frame = message.encode_datagram().map_err(SideChannelError::from)?;
            for id in plan.direct {
                match self.manager.send_data(&id, &frame).await {
                    Ok(()) => report.direct += 1,
                    Err(e) if mode == TransportMode::Relay => {
                        debug!(participant_id = %id, error = %e, "Data channel send failed, relaying");
                        fallback.push(id);
                    }
                    Err(e) => {
                        warn!(participant_id = %id, error = %e, "Data channel send failed");
                        return Err(SideChannelError::NoRoute(id).into());
                    }
                }
            }
        }

        let transport = self.transport.as_mut().ok_or(SideChannelError::NotInRoom)?;
        match plan.relayed {
            Relayed::None => {}
            Relayed::Broadcast => {
                transport.send(message.to_signaling(None)).await?;
                report.relayed += peers.len();
            }
            Relayed::Addressed(ids) => fallback.extend(ids),
        }
        for id in fallback {
            transport.send(message.to_signaling(Some(id))).await?;
            report.relayed += 1;
        }

        debug!(
            kind = message.payload.kind(),
            direct = report.direct,
            relayed = report.relayed,
            "Side message posted"
        );
        self.side.publish(message);
        Ok(report)
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut remotes: Vec<Participant> = self.registry.remotes().cloned().collect();
        remotes.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        SessionSnapshot {
            room: self.registry.room().cloned(),
            local: self.registry.local().cloned(),
            remotes,
            links: self.manager.snapshots(),
            mode: self.mode,
        }
    }

    // -----------------------------------------------------------------------
    // Signaling
    // -----------------------------------------------------------------------

    async fn handle_signaling(&mut self, event: SignalingEvent) {
        if !self.registry.is_in_room() {
            return;
        }
        match event {
            SignalingEvent::Connected => self.emit(SessionEvent::Signaling(SignalingStatus::Connected)),
            SignalingEvent::Disconnected => {
                warn!("Signaling lost, messages in flight are gone");
                self.emit(SessionEvent::Signaling(SignalingStatus::Disconnected));
            }
            SignalingEvent::Reconnected => {
                self.emit(SessionEvent::Signaling(SignalingStatus::Reconnected));
                let effects = self.manager.restart_after_signaling_gap().await;
                self.apply(effects).await;
            }
            SignalingEvent::Closed => self.emit(SessionEvent::Signaling(SignalingStatus::Closed)),
            SignalingEvent::Message(message) => self.handle_message(message).await,
            SignalingEvent::ExchangeCodeReady {
                participant_id,
                kind,
                code,
            } => {
                let qr = render_qr(&code);
                self.emit(SessionEvent::ExchangeCodeReady {
                    participant_id,
                    kind,
                    code,
                    qr,
                });
            }
            SignalingEvent::PeerIdentified {
                participant_id,
                display_name,
            } => {
                let Some(existing) = self.registry.remote(&participant_id) else {
                    return;
                };
                let mut renamed = existing.clone();
                renamed.display_name = display_name;
                self.registry.upsert_remote(renamed);
                if let Some(updated) = self.registry.remote(&participant_id).cloned() {
                    self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Updated(updated)));
                }
            }
        }
    }

    async fn handle_message(&mut self, message: SignalingMessage) {
        let local_id = self.registry.local_id().unwrap_or_default().to_string();
        match message {
            SignalingMessage::RoomParticipants { participants } => {
                // We are the newcomer: everyone already here will offer.
                for info in participants {
                    if info.participant_id == local_id {
                        continue;
                    }
                    let id = info.participant_id.clone();
                    self.add_remote(Participant::from_info(&info));
                    if !self.manager.contains(&id) {
                        let effects = self
                            .manager
                            .add_peer(&id, Role::Responder, self.camera_for_link(), 0)
                            .await;
                        self.apply(effects).await;
                    }
                }
            }
            SignalingMessage::ParticipantJoined {
                participant_id,
                participant_name,
                is_host,
                ..
            } => {
                if participant_id == local_id {
                    return;
                }
                let role = if is_host {
                    ParticipantRole::Host
                } else {
                    ParticipantRole::Participant
                };
                let is_new = self.add_remote(Participant::new(&participant_id, participant_name, role));
                let reinitiate = match (self.manager.role(&participant_id), self.manager.state(&participant_id)) {
                    (None, _) => true,
                    (Some(Role::Initiator), Some(state)) => {
                        state != ConnectionState::Connected
                    }
                    _ => false,
                };
                if is_new || reinitiate {
                    let retry_count = self.manager.retry_count(&participant_id).unwrap_or(0);
                    let effects = self
                        .manager
                        .add_peer(&participant_id, Role::Initiator, self.camera_for_link(), retry_count)
                        .await;
                    self.apply(effects).await;
                } else {
                    debug!(participant_id = %participant_id, "Duplicate join ignored");
                }
            }
            SignalingMessage::ParticipantLeft { participant_id, .. } => {
                self.remove_peer(&participant_id, "participant left").await;
            }
            SignalingMessage::ParticipantUpdated {
                participant_id,
                audio_enabled,
                video_enabled,
                screen_sharing,
                hand_raised,
                ..
            } => {
                let flags = [
                    (ParticipantFlag::Audio, audio_enabled),
                    (ParticipantFlag::Video, video_enabled),
                    (ParticipantFlag::ScreenShare, screen_sharing),
                    (ParticipantFlag::HandRaised, hand_raised),
                ];
                if let Some(updated) = self.registry.apply_remote_flags(&participant_id, &flags) {
                    self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Updated(updated)));
                }
            }
            message @ (SignalingMessage::Offer { .. }
            | SignalingMessage::Answer { .. }
            | SignalingMessage::IceCandidate { .. }) => {
                let effects = self.manager.handle_signal(message).await;
                self.apply(effects).await;
            }
            message @ (SignalingMessage::Chat { .. }
            | SignalingMessage::Reaction { .. }
            | SignalingMessage::Whiteboard { .. }) => match SideMessage::from_signaling(message) {
                Ok(side) if side.sender_id != local_id => self.deliver_side(side),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Dropping side message"),
            },
            SignalingMessage::Join { .. } => {}
        }
    }

    fn deliver_side(&self, mut message: SideMessage) {
        if message.sender_name.is_empty() {
            if let Some(sender) = self.registry.remote(&message.sender_id) {
                message.sender_name = sender.display_name.clone();
            }
        }
        self.side.publish(message);
    }

    async fn send_signal(&mut self, message: SignalingMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let kind = message.kind();
        if let Err(e) = transport.send(message).await {
            warn!(kind, error = %e, "Signaling send failed");
        }
    }

    // -----------------------------------------------------------------------
    // Engine, timers, polls
    // -----------------------------------------------------------------------

    async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Engine {
                participant_id,
                epoch,
                event,
            } => {
                let effects = self.manager.handle_engine(&participant_id, epoch, event).await;
                self.apply(effects).await;
            }
            SessionInput::Timer {
                participant_id,
                epoch,
                kind: TimerKind::GatheringGrace,
            } => {
                let effects = self.manager.on_gathering_timeout(&participant_id, epoch);
                self.apply(effects).await;
            }
            SessionInput::Timer {
                participant_id,
                epoch,
                kind: TimerKind::DisconnectGrace,
            } => {
                if !self.supervisor.on_timer_expired(&participant_id, epoch) {
                    return;
                }
                if self.manager.epoch(&participant_id) != Some(epoch) {
                    return;
                }
                info!(participant_id = %participant_id, "Recovery window elapsed, closing link");
                let effects = self
                    .manager
                    .close(&participant_id, Some("recovery window elapsed".into()))
                    .await;
                self.apply(effects).await;
                self.drop_participant(&participant_id, "recovery window elapsed");
            }
            SessionInput::RosterPolled { room_id, result } => {
                if self.registry.room().map(|r| r.id.as_str()) != Some(room_id.as_str()) {
                    return;
                }
                match result {
                    Ok(roster) => {
                        let diff = self.registry.apply_roster_update(roster);
                        for updated in diff.updated {
                            self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Updated(updated)));
                        }
                        for id in diff.departed {
                            info!(participant_id = %id, "Participant missing from room roster");
                            self.remove_peer(&id, "missing from room roster").await;
                        }
                    }
                    Err(e) => debug!(room_id = %room_id, error = %e, "Roster poll failed"),
                }
            }
        }
    }

    fn start_roster_poll(&mut self, room_id: &str) {
        let Some(interval) = self.options.roster_poll_interval else {
            return;
        };
        let rooms = Arc::clone(&self.deps.rooms);
        let inputs = self.inputs_tx.clone();
        let room_id = room_id.to_string();
        self.poll_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let result = rooms.list_participants(&room_id).await;
                let input = SessionInput::RosterPolled {
                    room_id: room_id.clone(),
                    result,
                };
                if inputs.send(input).is_err() {
                    break;
                }
            }
        }));
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    async fn apply(&mut self, effects: Vec<PeerEffect>) {
        let mut queue: VecDeque<PeerEffect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                PeerEffect::Send(message) => self.send_signal(message).await,
                PeerEffect::StateChanged {
                    participant_id,
                    state,
                    reason,
                } => {
                    self.emit(SessionEvent::ConnectionStateChanged {
                        participant_id: participant_id.clone(),
                        state,
                        reason,
                    });
                    let link = (
                        self.manager.epoch(&participant_id),
                        self.manager.role(&participant_id),
                        self.manager.retry_count(&participant_id),
                    );
                    let recovery = match link {
                        (Some(epoch), Some(role), Some(retry_count)) if !state.is_terminal() => {
                            self.supervisor
                                .on_state(&participant_id, epoch, role, state, retry_count)
                        }
                        _ => {
                            self.supervisor.cancel(&participant_id);
                            Recovery::None
                        }
                    };
                    if recovery == Recovery::Reoffer {
                        queue.extend(self.manager.reoffer(&participant_id).await);
                    }
                }
                PeerEffect::RemoteStream { participant_id, stream } => {
                    info!(participant_id = %participant_id, stream_id = %stream.id, "Remote stream attached");
                    self.emit(SessionEvent::RemoteStream { participant_id, stream });
                }
                PeerEffect::SideChannelReady { participant_id, ready } => {
                    self.emit(SessionEvent::SideChannelReady { participant_id, ready });
                }
                PeerEffect::DataMessage { participant_id, text } => {
                    match SideMessage::decode_datagram(&text, &participant_id) {
                        Ok(message) => self.deliver_side(message),
                        Err(e) => warn!(participant_id = %participant_id, error = %e, "Dropping data channel frame"),
                    }
                }
                PeerEffect::Stats { participant_id, stats } => {
                    let score = connection_quality(&stats);
                    if let Some(updated) = self.registry.set_connection_quality(&participant_id, score) {
                        self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Updated(updated)));
                    }
                }
                PeerEffect::Failed {
                    participant_id,
                    role,
                    retry_count,
                    reason,
                    retryable,
                } => {
                    // Without a relay nobody could carry a fresh offer.
                    let retryable = retryable && self.mode == Some(TransportMode::Relay);
                    match self.supervisor.on_failed(&participant_id, retry_count, retryable) {
                        Recovery::Recreate { retry_count } if self.registry.remote(&participant_id).is_some() => {
                            info!(
                                participant_id = %participant_id,
                                retry = retry_count,
                                reason = %reason,
                                "Recreating failed link"
                            );
                            let stream = self.camera_for_link();
                            queue.extend(self.manager.add_peer(&participant_id, role, stream, retry_count).await);
                        }
                        _ => self.drop_participant(&participant_id, &reason),
                    }
                }
            }
        }
    }

    /// Register a remote participant, announcing it when new.
    fn add_remote(&mut self, participant: Participant) -> bool {
        let snapshot = participant.clone();
        let is_new = self.registry.upsert_remote(participant);
        if is_new {
            info!(participant_id = %snapshot.participant_id, name = %snapshot.display_name, "Participant joined");
            self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Joined(snapshot)));
        }
        is_new
    }

    /// Close the link and drop the participant. Returns `false` when
    /// neither existed.
    async fn remove_peer(&mut self, participant_id: &str, reason: &str) -> bool {
        self.supervisor.cancel(participant_id);
        let effects = self.manager.close(participant_id, Some(reason.to_string())).await;
        let had_link = !effects.is_empty();
        self.apply(effects).await;
        match self.registry.remove_remote(participant_id) {
            Some(participant) => {
                info!(participant_id = %participant_id, reason, "Participant left");
                self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Left(participant)));
                true
            }
            None => had_link,
        }
    }

    /// The link is already gone; remove the participant and report the loss.
    fn drop_participant(&mut self, participant_id: &str, reason: &str) {
        let Some(participant) = self.registry.remove_remote(participant_id) else {
            return;
        };
        warn!(participant_id = %participant_id, reason, "Peer lost");
        self.emit(SessionEvent::PeerLost {
            participant_id: participant_id.to_string(),
            reason: reason.to_string(),
        });
        self.emit(SessionEvent::ParticipantChanged(ParticipantChange::Left(participant)));
    }
}

async fn next_signal(signals: &mut Option<mpsc::UnboundedReceiver<SignalingEvent>>) -> Option<SignalingEvent> {
    match signals {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
