use std::collections::VecDeque;

use serde::Serialize;
use tokio::task::JoinHandle;

use super::engine::RtcConnection;
use super::state::{ConnectionState, Role};
use crate::media::{LocalStream, StreamHandle};
use crate::protocol::{IceCandidateInit, SessionDescription};

/// Per-peer state owned by the [`super::PeerManager`].
pub(crate) struct PeerLink {
    pub(crate) participant_id: String,
    pub(crate) role: Role,
    pub(crate) state: ConnectionState,
    /// Bumped every time the link is recreated; engine events and timers
    /// from an older epoch are ignored.
    pub(crate) epoch: u64,
    pub(crate) connection: Box<dyn RtcConnection>,
    pub(crate) local_stream: Option<LocalStream>,
    pub(crate) screen_stream: Option<LocalStream>,
    pub(crate) remote_stream: Option<StreamHandle>,
    pub(crate) data_channel_open: bool,
    pub(crate) remote_description_set: bool,
    /// Remote candidates received before the remote description.
    pub(crate) pending_candidates: VecDeque<IceCandidateInit>,
    /// Local candidates gathered while `outgoing` is held back.
    pub(crate) gathered: Vec<IceCandidateInit>,
    /// Local description waiting for gathering to finish.
    pub(crate) outgoing: Option<SessionDescription>,
    pub(crate) retry_count: u32,
    pub(crate) gathering_timer: Option<JoinHandle<()>>,
    pub(crate) correlation_id: String,
}

impl PeerLink {
    pub(crate) fn side_channel_ready(&self) -> bool {
        self.data_channel_open && self.state == ConnectionState::Connected
    }

    pub(crate) fn cancel_gathering_timer(&mut self) {
        if let Some(handle) = self.gathering_timer.take() {
            handle.abort();
        }
    }

    pub(crate) fn snapshot(&self) -> PeerLinkSnapshot {
        PeerLinkSnapshot {
            participant_id: self.participant_id.clone(),
            role: self.role,
            state: self.state,
            local_stream_attached: self.local_stream.is_some() || self.screen_stream.is_some(),
            remote_stream: self.remote_stream.clone(),
            side_channel_ready: self.side_channel_ready(),
            pending_candidates: self.pending_candidates.len(),
            retry_count: self.retry_count,
        }
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.cancel_gathering_timer();
    }
}

/// Read-only view of a peer link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLinkSnapshot {
    pub participant_id: String,
    pub role: Role,
    pub state: ConnectionState,
    pub local_stream_attached: bool,
    pub remote_stream: Option<StreamHandle>,
    pub side_channel_ready: bool,
    pub pending_candidates: usize,
    pub retry_count: u32,
}
