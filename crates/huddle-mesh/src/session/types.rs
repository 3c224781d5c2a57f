use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use huddle_config::HuddleConfig;

use crate::error::{RoomError, SessionError};
use crate::media::{MediaSource, StreamHandle};
use crate::peer::{ConnectionState, EngineEvent, IceServers, PeerLinkSnapshot, PeerManagerOptions, RtcEngine};
use crate::protocol::SdpType;
use crate::registry::{Participant, ParticipantFlag, Room, RoomService, RoomSettings};
use crate::side_channel::{DeliveryReport, SidePayload};
use crate::signaling::{ManualExchange, RelayOptions, RelaySignaling, SignalingTransport, TransportMode};
use crate::supervisor::SupervisorOptions;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// ICE gathering grace before a description is sent anyway.
    GatheringGrace,
    /// Recovery window of a disconnected link.
    DisconnectGrace,
}

/// Everything that is not a command or a signaling event and still has to
/// pass through the session loop.
#[derive(Debug)]
pub enum SessionInput {
    Engine {
        participant_id: String,
        epoch: u64,
        event: EngineEvent,
    },
    Timer {
        participant_id: String,
        epoch: u64,
        kind: TimerKind,
    },
    RosterPolled {
        room_id: String,
        result: Result<Vec<Participant>, RoomError>,
    },
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantChange {
    Joined(Participant),
    Updated(Participant),
    Left(Participant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingStatus {
    Connected,
    Disconnected,
    Reconnected,
    Closed,
}

/// What the session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RoomEntered {
        room: Room,
        local: Participant,
        mode: TransportMode,
    },
    RoomLeft {
        room_id: String,
    },
    RoomUpdated(Room),
    ParticipantChanged(ParticipantChange),
    ConnectionStateChanged {
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
    /// The link is gone for good and the participant was removed.
    PeerLost {
        participant_id: String,
        reason: String,
    },
    /// A manual-mode description to hand to the other person.
    ExchangeCodeReady {
        participant_id: String,
        kind: SdpType,
        code: String,
        qr: Option<String>,
    },
    Signaling(SignalingStatus),
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub room: Option<Room>,
    pub local: Option<Participant>,
    pub remotes: Vec<Participant>,
    pub links: Vec<PeerLinkSnapshot>,
    pub mode: Option<TransportMode>,
}

impl SessionSnapshot {
    /// Remote participants plus the local one.
    pub fn roster_size(&self) -> usize {
        self.remotes.len() + usize::from(self.local.is_some())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub display_name: String,
    /// `None` takes the configured default.
    pub max_participants: Option<usize>,
    pub settings: RoomSettings,
    pub password: Option<String>,
    /// Stable id of the creating user; generated when absent.
    pub user_id: Option<String>,
}

impl NewRoom {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            max_participants: None,
            settings: RoomSettings::default(),
            password: None,
            user_id: None,
        }
    }
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum SessionCommand {
    CreateRoom {
        request: NewRoom,
        reply: Reply<Room>,
    },
    JoinRoom {
        request: crate::registry::JoinRoomRequest,
        reply: Reply<Room>,
    },
    StartManualHost {
        display_name: String,
        reply: Reply<Room>,
    },
    StartManualGuest {
        display_name: String,
        reply: Reply<Room>,
    },
    PasteExchangeCode {
        code: String,
        reply: Reply<()>,
    },
    LeaveRoom {
        reply: Reply<bool>,
    },
    HangUp {
        participant_id: String,
        reply: Reply<bool>,
    },
    SetFlag {
        flag: ParticipantFlag,
        value: bool,
        reply: Reply<Participant>,
    },
    StartScreenShare {
        reply: Reply<StreamHandle>,
    },
    StopScreenShare {
        reply: Reply<bool>,
    },
    SetLocked {
        locked: bool,
        reply: Reply<Room>,
    },
    Post {
        payload: SidePayload,
        reply: Reply<DeliveryReport>,
    },
    ReleasePreview {
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Builds the signaling transport for a mode.
pub trait TransportFactory: Send + Sync {
    fn create(&self, mode: TransportMode) -> Box<dyn SignalingTransport>;
}

/// Relay transport for online rooms, copy/paste exchange for manual ones.
pub struct DefaultTransports {
    relay: RelayOptions,
}

impl DefaultTransports {
    pub fn new(relay: RelayOptions) -> Self {
        Self { relay }
    }
}

impl TransportFactory for DefaultTransports {
    fn create(&self, mode: TransportMode) -> Box<dyn SignalingTransport> {
        match mode {
            TransportMode::Relay => Box::new(RelaySignaling::new(self.relay.clone())),
            TransportMode::Manual => Box::new(ManualExchange::new()),
        }
    }
}

/// External collaborators a session runs against.
#[derive(Clone)]
pub struct SessionDeps {
    pub rooms: Arc<dyn RoomService>,
    pub media: Arc<dyn MediaSource>,
    pub engine: Arc<dyn RtcEngine>,
    pub transports: Arc<dyn TransportFactory>,
}

#[derive(Debug, Clone)]
pub struct MeshOptions {
    pub ice_servers: IceServers,
    pub data_channel_label: String,
    pub gathering_timeout: Duration,
    pub disconnect_grace: Duration,
    pub max_retries: u32,
    pub max_participants: usize,
    pub room_expiry_hours: u32,
    /// `None` disables the roster-consistency poll.
    pub roster_poll_interval: Option<Duration>,
    pub bus_capacity: usize,
}

impl MeshOptions {
    pub(crate) fn peer_options(&self) -> PeerManagerOptions {
        PeerManagerOptions {
            ice_servers: self.ice_servers.clone(),
            data_channel_label: self.data_channel_label.clone(),
            gathering_timeout: self.gathering_timeout,
        }
    }

    pub(crate) fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            disconnect_grace: self.disconnect_grace,
            max_retries: self.max_retries,
            auto_reoffer: true,
        }
    }
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self::from(&HuddleConfig::default())
    }
}

impl From<&HuddleConfig> for MeshOptions {
    fn from(config: &HuddleConfig) -> Self {
        Self {
            ice_servers: IceServers::from(&config.ice),
            data_channel_label: config.side_channel.data_channel_label.clone(),
            gathering_timeout: Duration::from_millis(u64::from(config.peer.ice_gathering_timeout_ms)),
            disconnect_grace: Duration::from_secs(u64::from(config.peer.disconnect_grace_secs)),
            max_retries: config.peer.max_retries,
            max_participants: config.room.max_participants as usize,
            room_expiry_hours: config.room.expiry_hours,
            roster_poll_interval: Some(Duration::from_secs(u64::from(config.room.roster_poll_interval_secs))),
            bus_capacity: config.side_channel.bus_capacity as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let options = MeshOptions::default();
        assert_eq!(options.gathering_timeout, Duration::from_millis(2000));
        assert_eq!(options.disconnect_grace, Duration::from_secs(10));
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.max_participants, 8);
        assert_eq!(options.roster_poll_interval, Some(Duration::from_secs(5)));
        assert_eq!(options.data_channel_label, "huddle");
    }

    #[test]
    fn default_transports_match_mode() {
        let transports = DefaultTransports::new(RelayOptions::default());
        assert_eq!(transports.create(TransportMode::Relay).mode(), TransportMode::Relay);
        assert_eq!(transports.create(TransportMode::Manual).mode(), TransportMode::Manual);
    }
}
