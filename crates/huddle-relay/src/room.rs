//! Room store: maps room ids to the members connected to them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use huddle_mesh::protocol::ParticipantInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is full ({max} members)")]
    Full { max: usize },
}

struct Member {
    info: ParticipantInfo,
    tx: mpsc::Sender<String>,
    /// Distinguishes a rejoin from the connection it replaced.
    conn_id: u64,
}

#[derive(Default)]
struct Room {
    members: HashMap<String, Member>,
    emptied_at: Option<Instant>,
}

pub struct Joined {
    pub conn_id: u64,
    /// Everyone else already in the room.
    pub existing: Vec<ParticipantInfo>,
    pub replaced: bool,
}

/// Thread-safe room store.
#[derive(Clone)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    max_members: usize,
    next_conn: Arc<std::sync::atomic::AtomicU64>,
}

impl RoomStore {
    pub fn new(max_members: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            max_members,
            next_conn: Arc::new(std::sync::atomic::AtomicU64::new(1)),
        }
    }

    /// Add a member. A participant id already present is replaced; its old
    /// connection sees its queue close.
    pub async fn join(
        &self,
        room_id: &str,
        info: ParticipantInfo,
        tx: mpsc::Sender<String>,
    ) -> Result<Joined, JoinError> {
        let mut map = self.rooms.write().await;
        let room = map.entry(room_id.to_string()).or_default();
        let replaced = room.members.contains_key(&info.participant_id);
        if !replaced && room.members.len() >= self.max_members {
            return Err(JoinError::Full {
                max: self.max_members,
            });
        }

        let conn_id = self
            .next_conn
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut existing: Vec<ParticipantInfo> = room
            .members
            .values()
            .filter(|m| m.info.participant_id != info.participant_id)
            .map(|m| m.info.clone())
            .collect();
        existing.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));

        room.members
            .insert(info.participant_id.clone(), Member { info, tx, conn_id });
        room.emptied_at = None;
        Ok(Joined {
            conn_id,
            existing,
            replaced,
        })
    }

    /// Remove a member if `conn_id` is still the live connection. Returns
    /// false when a rejoin already took the seat.
    pub async fn leave(&self, room_id: &str, participant_id: &str, conn_id: u64) -> bool {
        let mut map = self.rooms.write().await;
        let Some(room) = map.get_mut(room_id) else {
            return false;
        };
        if room.members.get(participant_id).map(|m| m.conn_id) != Some(conn_id) {
            return false;
        }
        room.members.remove(participant_id);
        if room.members.is_empty() {
            room.emptied_at = Some(Instant::now());
        }
        true
    }

    /// Senders for `to`, or for every member but `from` when `to` is absent.
    pub async fn targets(&self, room_id: &str, from: &str, to: Option<&str>) -> Vec<mpsc::Sender<String>> {
        let map = self.rooms.read().await;
        let Some(room) = map.get(room_id) else {
            return Vec::new();
        };
        match to {
            Some(to) => room.members.get(to).map(|m| m.tx.clone()).into_iter().collect(),
            None => room
                .members
                .iter()
                .filter(|(id, _)| id.as_str() != from)
                .map(|(_, m)| m.tx.clone())
                .collect(),
        }
    }

    /// Keep the stored flags current so later joiners see them in
    /// `room-participants`.
    pub async fn update_flags(
        &self,
        room_id: &str,
        participant_id: &str,
        audio_enabled: bool,
        video_enabled: bool,
        screen_sharing: bool,
        hand_raised: bool,
    ) {
        let mut map = self.rooms.write().await;
        if let Some(member) = map
            .get_mut(room_id)
            .and_then(|r| r.members.get_mut(participant_id))
        {
            member.info.audio_enabled = audio_enabled;
            member.info.video_enabled = video_enabled;
            member.info.screen_sharing = screen_sharing;
            member.info.hand_raised = hand_raised;
        }
    }

    /// Drop rooms that have been empty for longer than `ttl`.
    pub async fn reap_empty(&self, ttl: Duration) -> usize {
        let mut map = self.rooms.write().await;
        let now = Instant::now();
        let before = map.len();
        map.retain(|id, room| {
            let stale = room
                .emptied_at
                .is_some_and(|at| now.duration_since(at) > ttl);
            if stale {
                tracing::info!(room_id = %id, "Reaping empty room");
            }
            !stale
        });
        before - map.len()
    }

    pub async fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, |r| r.members.len())
    }

    pub async fn count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
