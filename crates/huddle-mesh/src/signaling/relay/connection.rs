//! Background WebSocket connection loop with fixed-delay reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::RelayOptions;
use crate::protocol::SignalingMessage;
use crate::signaling::{Announce, SignalingEvent};

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Runs until [`super::RelaySignaling::close`] flips `shutdown`.
pub(crate) async fn connection_loop(
    options: RelayOptions,
    announce: Announce,
    connected: Arc<RwLock<bool>>,
    events: mpsc::UnboundedSender<SignalingEvent>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let outbound_rx = Arc::new(Mutex::new(outbound_rx));
    let mut has_connected = false;

    'session: loop {
        if *shutdown.borrow() {
            break;
        }
        info!(url = %options.url, room_id = %announce.room_id, "Connecting to signaling relay");

        match tokio::time::timeout(
            options.connect_timeout,
            tokio_tungstenite::connect_async(options.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                let (mut ws_write, mut ws_read) = ws_stream.split();

                if has_connected {
                    // Anything queued while offline belongs to a lost exchange.
                    let mut rx = outbound_rx.lock().await;
                    let mut dropped = 0usize;
                    while rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                    if dropped > 0 {
                        debug!(dropped, "Discarded messages queued while disconnected");
                    }
                }

                let join = match announce.to_join().encode() {
                    Ok(join) => join,
                    Err(e) => {
                        error!(error = %e, "Failed to encode join");
                        break;
                    }
                };
                if let Err(e) = ws_write.send(WsMessage::Text(join.into())).await {
                    warn!(error = %e, "Failed to announce on relay");
                } else {
                    *connected.write().await = true;
                    let event = if has_connected {
                        info!("Reconnected to signaling relay");
                        SignalingEvent::Reconnected
                    } else {
                        info!("Connected to signaling relay");
                        SignalingEvent::Connected
                    };
                    has_connected = true;
                    let _ = events.send(event);

                    let ws_write = Arc::new(Mutex::new(ws_write));
                    let heartbeat_handle = tokio::spawn(heartbeat_task(
                        Arc::clone(&ws_write),
                        options.heartbeat_interval,
                    ));
                    let forward_handle = tokio::spawn(outbound_forwarder(
                        Arc::clone(&outbound_rx),
                        Arc::clone(&ws_write),
                    ));

                    let closed_by_us = loop {
                        tokio::select! {
                            frame = ws_read.next() => match frame {
                                Some(Ok(WsMessage::Text(text))) => {
                                    if let Some(message) = route_inbound(&text, &announce.participant_id) {
                                        let _ = events.send(SignalingEvent::Message(message));
                                    }
                                }
                                Some(Ok(WsMessage::Close(_))) | None => {
                                    info!("Signaling relay closed connection");
                                    break false;
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "Signaling WebSocket error");
                                    break false;
                                }
                                Some(Ok(_)) => {}
                            },
                            _ = shutdown.changed() => break true,
                        }
                    };

                    heartbeat_handle.abort();
                    forward_handle.abort();
                    *connected.write().await = false;

                    if closed_by_us {
                        let mut writer = ws_write.lock().await;
                        let _ = writer.send(WsMessage::Close(None)).await;
                        break 'session;
                    }
                    let _ = events.send(SignalingEvent::Disconnected);
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = options.connect_timeout.as_secs(),
                    "Signaling relay connect timed out"
                );
            }
        }

        info!(
            delay_secs = options.reconnect_delay.as_secs(),
            "Reconnecting to signaling relay"
        );
        tokio::select! {
            _ = tokio::time::sleep(options.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    *connected.write().await = false;
    let _ = events.send(SignalingEvent::Closed);
    info!("Signaling relay connection closed");
}

/// Validate one inbound frame. Malformed frames and point-to-point
/// messages for someone else are dropped.
pub(crate) fn route_inbound(text: &str, local_id: &str) -> Option<SignalingMessage> {
    let message = match SignalingMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping malformed signaling frame");
            return None;
        }
    };
    if let Some(to) = message.recipient() {
        if to != local_id {
            debug!(kind = message.kind(), to = %to, "Dropping message addressed to another participant");
            return None;
        }
    }
    debug!(kind = message.kind(), from = ?message.sender(), "Signaling message received");
    Some(message)
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval: Duration)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(interval);
    interval.tick().await;
    loop {
        interval.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Vec::<u8>::new().into())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound Forwarder
// ---------------------------------------------------------------------------

async fn outbound_forwarder<S>(outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>, ws_write: Arc<Mutex<S>>)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = outbound_rx.lock().await;
    while let Some(text) = rx.recv().await {
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Text(text.into())).await.is_err() {
            break;
        }
    }
}
