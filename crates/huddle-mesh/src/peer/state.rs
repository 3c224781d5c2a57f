use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one peer link.
///
/// ```text
/// initiator: New -> Gathering -> Offering -> Connecting -> Connected
/// responder: New -> Answering -> Connecting -> Connected
/// Connected <-> Disconnected, any active state -> Failed | Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Gathering,
    Offering,
    Answering,
    Connecting,
    Connected,
    Disconnected,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Closed) {
            return true;
        }
        matches!(
            (self, next),
            (New, Gathering)
                | (New, Answering)
                | (Gathering, Offering)
                | (Offering, Connecting)
                | (Answering, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Connected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Gathering => "gathering",
            ConnectionState::Offering => "offering",
            ConnectionState::Answering => "answering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which side of the offer/answer exchange a link plays. Fixed at link
/// creation and never renegotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}
