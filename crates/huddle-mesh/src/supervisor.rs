//! Reconnection supervisor.
//!
//! Watches link state changes. A link entering `Disconnected` gets a
//! recovery window; if it is not `Connected` again when the window closes
//! the session tears it down. Automatic re-offers and link recreation are
//! capped by `max_retries`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::peer::{ConnectionState, Role};
use crate::session::{SessionInput, TimerKind};

/// Post a [`SessionInput::Timer`] after `after`. Abort the handle to cancel.
pub(crate) fn spawn_timer(
    inputs: mpsc::UnboundedSender<SessionInput>,
    participant_id: String,
    epoch: u64,
    kind: TimerKind,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = inputs.send(SessionInput::Timer {
            participant_id,
            epoch,
            kind,
        });
    })
}

/// What the session should do about a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Send an ICE-restart offer on the existing link.
    Reoffer,
    /// Build a fresh link in the same role.
    Recreate { retry_count: u32 },
    /// Remove the link and the participant.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub disconnect_grace: Duration,
    pub max_retries: u32,
    /// Re-offer on disconnect. Only meaningful with a relay to carry it.
    pub auto_reoffer: bool,
}

pub struct ReconnectionSupervisor {
    options: SupervisorOptions,
    inputs: mpsc::UnboundedSender<SessionInput>,
    timers: HashMap<String, (u64, JoinHandle<()>)>,
}

impl ReconnectionSupervisor {
    pub fn new(options: SupervisorOptions, inputs: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self {
            options,
            inputs,
            timers: HashMap::new(),
        }
    }

    pub fn set_auto_reoffer(&mut self, enabled: bool) {
        self.options.auto_reoffer = enabled;
    }

    pub fn is_watching(&self, participant_id: &str) -> bool {
        self.timers.contains_key(participant_id)
    }

    /// Observe a state change of the link at `epoch`.
    pub fn on_state(
        &mut self,
        participant_id: &str,
        epoch: u64,
        role: Role,
        state: ConnectionState,
        retry_count: u32,
    ) -> Recovery {
        match state {
            ConnectionState::Disconnected => {
                if !self.timers.contains_key(participant_id) {
                    debug!(
                        participant_id = %participant_id,
                        grace_secs = self.options.disconnect_grace.as_secs(),
                        "Recovery window started"
                    );
                    let handle = spawn_timer(
                        self.inputs.clone(),
                        participant_id.to_string(),
                        epoch,
                        TimerKind::DisconnectGrace,
                        self.options.disconnect_grace,
                    );
                    self.timers.insert(participant_id.to_string(), (epoch, handle));
                }
                if self.options.auto_reoffer && role == Role::Initiator && retry_count < self.options.max_retries {
                    Recovery::Reoffer
                } else {
                    Recovery::None
                }
            }
            ConnectionState::Connected => {
                if self.cancel(participant_id) {
                    info!(participant_id = %participant_id, "Peer recovered");
                }
                Recovery::None
            }
            // A fresh link or a finished one: any window belongs to the past.
            ConnectionState::New | ConnectionState::Closed | ConnectionState::Failed => {
                self.cancel(participant_id);
                Recovery::None
            }
            _ => Recovery::None,
        }
    }

    /// A link ended in `Failed`.
    pub fn on_failed(&mut self, participant_id: &str, retry_count: u32, retryable: bool) -> Recovery {
        self.cancel(participant_id);
        if retryable && retry_count < self.options.max_retries {
            Recovery::Recreate {
                retry_count: retry_count + 1,
            }
        } else {
            Recovery::GiveUp
        }
    }

    /// A recovery timer fired. Returns `true` when it is still current and
    /// the link must be torn down.
    pub fn on_timer_expired(&mut self, participant_id: &str, epoch: u64) -> bool {
        match self.timers.get(participant_id) {
            Some((current, _)) if *current == epoch => {
                self.timers.remove(participant_id);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, participant_id: &str) -> bool {
        match self.timers.remove(participant_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for ReconnectionSupervisor {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(max_retries: u32) -> (ReconnectionSupervisor, mpsc::UnboundedReceiver<SessionInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = SupervisorOptions {
            disconnect_grace: Duration::from_secs(10),
            max_retries,
            auto_reoffer: true,
        };
        (ReconnectionSupervisor::new(options, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn window_expires_without_recovery() {
        let (mut sup, mut rx) = supervisor(1);
        let recovery = sup.on_state("bob", 3, Role::Responder, ConnectionState::Disconnected, 0);
        assert_eq!(recovery, Recovery::None);
        assert!(sup.is_watching("bob"));

        tokio::time::advance(Duration::from_secs(11)).await;
        match rx.recv().await.unwrap() {
            SessionInput::Timer {
                participant_id,
                epoch,
                kind,
            } => {
                assert_eq!(participant_id, "bob");
                assert_eq!(epoch, 3);
                assert_eq!(kind, TimerKind::DisconnectGrace);
                assert!(sup.on_timer_expired(&participant_id, epoch));
            }
            other => panic!("unexpected input {other:?}"),
        }
        assert!(!sup.is_watching("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_cancels_window() {
        let (mut sup, mut rx) = supervisor(1);
        sup.on_state("bob", 1, Role::Responder, ConnectionState::Disconnected, 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        sup.on_state("bob", 1, Role::Responder, ConnectionState::Connected, 0);
        assert!(!sup.is_watching("bob"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn initiator_reoffers_once_per_disconnect() {
        let (mut sup, _rx) = supervisor(1);
        assert_eq!(
            sup.on_state("bob", 1, Role::Initiator, ConnectionState::Disconnected, 0),
            Recovery::Reoffer
        );
        assert_eq!(
            sup.on_state("bob", 1, Role::Initiator, ConnectionState::Disconnected, 1),
            Recovery::None
        );
    }

    #[tokio::test]
    async fn manual_mode_never_reoffers() {
        let (mut sup, _rx) = supervisor(1);
        sup.set_auto_reoffer(false);
        assert_eq!(
            sup.on_state("manual-peer", 1, Role::Initiator, ConnectionState::Disconnected, 0),
            Recovery::None
        );
        assert!(sup.is_watching("manual-peer"));
    }

    #[tokio::test]
    async fn stale_timer_is_ignored() {
        let (mut sup, _rx) = supervisor(1);
        sup.on_state("bob", 1, Role::Initiator, ConnectionState::Disconnected, 0);
        sup.on_state("bob", 2, Role::Initiator, ConnectionState::New, 0);
        assert!(!sup.on_timer_expired("bob", 1));
    }

    #[tokio::test]
    async fn failures_recreate_until_retries_run_out() {
        let (mut sup, _rx) = supervisor(1);
        assert_eq!(sup.on_failed("bob", 0, true), Recovery::Recreate { retry_count: 1 });
        assert_eq!(sup.on_failed("bob", 1, true), Recovery::GiveUp);
        assert_eq!(sup.on_failed("carol", 0, false), Recovery::GiveUp);
    }
}
