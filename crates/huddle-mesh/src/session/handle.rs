use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;

use huddle_common::SessionId;

use super::driver::SessionDriver;
use super::types::{MeshOptions, NewRoom, Reply, SessionCommand, SessionDeps, SessionEvent, SessionSnapshot};
use crate::error::SessionError;
use crate::media::StreamHandle;
use crate::protocol::WhiteboardOp;
use crate::registry::{JoinRoomRequest, Participant, ParticipantFlag, Room};
use crate::side_channel::{DeliveryReport, SideChannelBus, SideMessage, SidePayload};

/// Handle to a running conferencing session.
///
/// Cheap to clone. The session task stops, leaving any room, once every
/// clone is dropped.
#[derive(Clone)]
pub struct MeshSession {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    side: SideChannelBus,
}

impl MeshSession {
    /// Spawn the session task. Events are delivered on the returned
    /// receiver; side-channel messages through [`MeshSession::subscribe`].
    pub fn new(deps: SessionDeps, options: MeshOptions) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let id = SessionId::new();
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let side = SideChannelBus::new(options.bus_capacity);

        let driver = SessionDriver::new(deps, options, side.clone(), commands_rx, events_tx);
        tokio::spawn(driver.run());
        info!(session_id = %id, "Mesh session started");

        (
            Self {
                id,
                commands: commands_tx,
                side,
            },
            events_rx,
        )
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    /// Capture local media, create a room on the room service and join it
    /// as host over the relay.
    pub async fn create_room(&self, request: NewRoom) -> Result<Room, SessionError> {
        self.request(|reply| SessionCommand::CreateRoom { request, reply }).await
    }

    pub async fn join_room(&self, request: JoinRoomRequest) -> Result<Room, SessionError> {
        self.request(|reply| SessionCommand::JoinRoom { request, reply }).await
    }

    /// Start a relay-less session that produces the offer code.
    pub async fn start_manual_host(&self, display_name: impl Into<String>) -> Result<Room, SessionError> {
        let display_name = display_name.into();
        self.request(|reply| SessionCommand::StartManualHost { display_name, reply })
            .await
    }

    /// Start a relay-less session that answers a pasted offer code.
    pub async fn start_manual_guest(&self, display_name: impl Into<String>) -> Result<Room, SessionError> {
        let display_name = display_name.into();
        self.request(|reply| SessionCommand::StartManualGuest { display_name, reply })
            .await
    }

    /// Feed the code the other person handed over.
    pub async fn paste_exchange_code(&self, code: impl Into<String>) -> Result<(), SessionError> {
        let code = code.into();
        self.request(|reply| SessionCommand::PasteExchangeCode { code, reply })
            .await
    }

    /// Leave the current room. Returns `false` when there was none.
    pub async fn leave_room(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::LeaveRoom { reply }).await
    }

    /// Close the link to one participant.
    pub async fn hang_up(&self, participant_id: impl Into<String>) -> Result<bool, SessionError> {
        let participant_id = participant_id.into();
        self.request(|reply| SessionCommand::HangUp { participant_id, reply })
            .await
    }

    pub async fn set_locked(&self, locked: bool) -> Result<Room, SessionError> {
        self.request(|reply| SessionCommand::SetLocked { locked, reply }).await
    }

    // -----------------------------------------------------------------------
    // Local participant
    // -----------------------------------------------------------------------

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<Participant, SessionError> {
        self.set_flag(ParticipantFlag::Audio, enabled).await
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<Participant, SessionError> {
        self.set_flag(ParticipantFlag::Video, enabled).await
    }

    pub async fn set_hand_raised(&self, raised: bool) -> Result<Participant, SessionError> {
        self.set_flag(ParticipantFlag::HandRaised, raised).await
    }

    async fn set_flag(&self, flag: ParticipantFlag, value: bool) -> Result<Participant, SessionError> {
        self.request(|reply| SessionCommand::SetFlag { flag, value, reply })
            .await
    }

    pub async fn start_screen_share(&self) -> Result<StreamHandle, SessionError> {
        self.request(|reply| SessionCommand::StartScreenShare { reply }).await
    }

    pub async fn stop_screen_share(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::StopScreenShare { reply }).await
    }

    /// Drop the preview's hold on the camera. Tracks stop once no link
    /// uses them either.
    pub async fn release_preview(&self) -> Result<bool, SessionError> {
        self.query(|reply| SessionCommand::ReleasePreview { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.query(|reply| SessionCommand::Snapshot { reply }).await
    }

    // -----------------------------------------------------------------------
    // Side channel
    // -----------------------------------------------------------------------

    pub async fn post_chat_message(&self, text: impl Into<String>) -> Result<DeliveryReport, SessionError> {
        self.post(SidePayload::Chat { text: text.into() }).await
    }

    pub async fn post_reaction(&self, emoji: impl Into<String>) -> Result<DeliveryReport, SessionError> {
        self.post(SidePayload::Reaction { emoji: emoji.into() }).await
    }

    pub async fn post_whiteboard_op(&self, op: WhiteboardOp) -> Result<DeliveryReport, SessionError> {
        self.post(SidePayload::Whiteboard { op }).await
    }

    async fn post(&self, payload: SidePayload) -> Result<DeliveryReport, SessionError> {
        self.request(|reply| SessionCommand::Post { payload, reply }).await
    }

    /// Chat, reactions and whiteboard ops from every participant, local
    /// posts included, whichever transport carried them.
    pub fn subscribe(&self) -> broadcast::Receiver<SideMessage> {
        self.side.subscribe()
    }
}
