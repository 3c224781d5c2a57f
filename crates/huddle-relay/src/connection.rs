//! Per-connection handler: read `join`, register, then route messages.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use huddle_mesh::protocol::{ParticipantInfo, SignalingMessage};

use crate::room::RoomStore;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, store: RoomStore) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

struct Identity {
    room_id: String,
    info: ParticipantInfo,
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(ws: WebSocketStream<TcpStream>, addr: SocketAddr, store: RoomStore) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame names the room and the participant.
    let Some(Identity { room_id, info }) = read_join(&mut stream, addr).await else {
        return;
    };
    let participant_id = info.participant_id.clone();

    // 2. Register our outbound queue.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let joined = match store.join(&room_id, info.clone(), tx).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::warn!(peer = %addr, room_id = %room_id, error = %e, "Join refused");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    let members = store.member_count(&room_id).await;
    tracing::info!(
        peer = %addr,
        room_id = %room_id,
        participant_id = %participant_id,
        replaced = joined.replaced,
        members,
        "Participant connected"
    );

    // 3. Roster to the joiner, announcement to everyone else.
    let roster = SignalingMessage::RoomParticipants {
        participants: joined.existing,
    };
    if send_message(&mut sink, &roster).await.is_err() {
        store.leave(&room_id, &participant_id, joined.conn_id).await;
        return;
    }
    let announcement = SignalingMessage::ParticipantJoined {
        participant_id: participant_id.clone(),
        participant_name: info.participant_name.clone(),
        is_host: info.is_host,
        timestamp: Utc::now(),
    };
    forward(&store, &room_id, &participant_id, None, &announcement).await;

    // 4. Routing loop.
    loop {
        tokio::select! {
            queued = rx.recv() => match queued {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // A rejoin took our seat.
                None => break,
            },

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        route(&store, &room_id, &participant_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 5. Cleanup.
    if store.leave(&room_id, &participant_id, joined.conn_id).await {
        tracing::info!(room_id = %room_id, participant_id = %participant_id, "Participant disconnected");
        let left = SignalingMessage::ParticipantLeft {
            participant_id: participant_id.clone(),
            timestamp: Utc::now(),
        };
        forward(&store, &room_id, &participant_id, None, &left).await;
    } else {
        tracing::debug!(participant_id = %participant_id, "Replaced connection closed");
    }
}

/// Stamp the sender and deliver one client frame.
async fn route(store: &RoomStore, room_id: &str, participant_id: &str, text: &str) {
    let mut message = match SignalingMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(participant_id = %participant_id, error = %e, "Dropping malformed frame");
            return;
        }
    };
    if matches!(
        message,
        SignalingMessage::Join { .. } | SignalingMessage::RoomParticipants { .. }
    ) {
        tracing::debug!(participant_id = %participant_id, kind = message.kind(), "Ignoring client frame");
        return;
    }
    if matches!(
        message,
        SignalingMessage::ParticipantJoined { .. } | SignalingMessage::ParticipantLeft { .. }
    ) {
        tracing::warn!(participant_id = %participant_id, kind = message.kind(), "Client sent relay-only frame");
        return;
    }

    if let SignalingMessage::ParticipantUpdated {
        participant_id: claimed,
        audio_enabled,
        video_enabled,
        screen_sharing,
        hand_raised,
        ..
    } = &mut message
    {
        *claimed = participant_id.to_string();
        store
            .update_flags(
                room_id,
                participant_id,
                *audio_enabled,
                *video_enabled,
                *screen_sharing,
                *hand_raised,
            )
            .await;
    } else {
        message.set_sender(participant_id);
    }
    let to = message.recipient().map(str::to_string);
    forward(store, room_id, participant_id, to.as_deref(), &message).await;
}

async fn forward(store: &RoomStore, room_id: &str, from: &str, to: Option<&str>, message: &SignalingMessage) {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            return;
        }
    };
    let targets = store.targets(room_id, from, to).await;
    if targets.is_empty() {
        if let Some(to) = to {
            tracing::debug!(room_id = %room_id, to = %to, kind = message.kind(), "Recipient not connected");
        }
        return;
    }
    tracing::debug!(room_id = %room_id, from = %from, kind = message.kind(), targets = targets.len(), "Forwarding");
    for tx in targets {
        if tx.send(text.clone()).await.is_err() {
            // Peer's channel closed, they disconnected.
            tracing::debug!(room_id = %room_id, "Peer channel closed");
        }
    }
}

/// Read and parse the first message as a `join`.
async fn read_join(stream: &mut WsStream, addr: SocketAddr) -> Option<Identity> {
    let frame = tokio::time::timeout(JOIN_TIMEOUT, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match SignalingMessage::decode(&text) {
            Ok(SignalingMessage::Join {
                room_id,
                participant_id,
                participant_name,
                is_host,
                ..
            }) => Some(Identity {
                room_id,
                info: ParticipantInfo {
                    participant_id,
                    participant_name,
                    is_host,
                    audio_enabled: true,
                    video_enabled: true,
                    screen_sharing: false,
                    hand_raised: false,
                },
            }),
            Ok(other) => {
                tracing::warn!(peer = %addr, kind = other.kind(), "Expected join");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid join message");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text join, got another frame");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during join");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before join");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, "Join timeout (10s)");
            None
        }
    }
}

/// Send a message as a JSON text frame.
async fn send_message(sink: &mut WsSink, message: &SignalingMessage) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = message
        .encode()
        .map_err(|e| tokio_tungstenite::tungstenite::Error::Io(std::io::Error::other(e.to_string())))?;
    sink.send(Message::Text(json.into())).await
}
