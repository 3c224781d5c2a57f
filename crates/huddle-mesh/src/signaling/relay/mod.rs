//! Online signaling through the huddle relay.

mod connection;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, RwLock};
use huddle_config::schema::SignalingConfig;

use super::{Announce, SignalingEvent, SignalingTransport, TransportMode};
use crate::error::SignalingError;
use crate::protocol::SignalingMessage;
use connection::connection_loop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&SignalingConfig::default())
    }
}

impl From<&SignalingConfig> for RelayOptions {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            url: config.relay_url.clone(),
            reconnect_delay: Duration::from_secs(u64::from(config.reconnect_delay_secs)),
            connect_timeout: Duration::from_secs(u64::from(config.connect_timeout_secs)),
            heartbeat_interval: Duration::from_secs(u64::from(config.heartbeat_interval_secs)),
        }
    }
}

/// Handle to the background relay connection.
///
/// `send` queues a frame for the connection task. Frames queued before the
/// first connect go out once it succeeds; frames queued while a dropped
/// connection is down are discarded on reconnect.
pub struct RelaySignaling {
    options: RelayOptions,
    outbound: Option<mpsc::UnboundedSender<String>>,
    shutdown: Option<watch::Sender<bool>>,
    connected: Arc<RwLock<bool>>,
}

impl RelaySignaling {
    pub fn new(options: RelayOptions) -> Self {
        Self {
            options,
            outbound: None,
            shutdown: None,
            connected: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }
}

#[async_trait]
impl SignalingTransport for RelaySignaling {
    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }

    async fn connect(
        &mut self,
        announce: Announce,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<(), SignalingError> {
        self.close().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.outbound = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);

        tokio::spawn(connection_loop(
            self.options.clone(),
            announce,
            Arc::clone(&self.connected),
            events,
            outbound_rx,
            shutdown_rx,
        ));
        Ok(())
    }

    async fn send(&mut self, message: SignalingMessage) -> Result<(), SignalingError> {
        let outbound = self.outbound.as_ref().ok_or(SignalingError::Closed)?;
        let text = message.encode()?;
        outbound.send(text).map_err(|_| SignalingError::Closed)
    }

    async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        self.outbound = None;
    }
}
