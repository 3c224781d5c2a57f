//! Room metadata service boundary.
//!
//! The mesh core only consumes rooms; persistence lives behind
//! [`RoomService`]. [`LocalRoomService`] keeps everything in memory and is
//! what manual mode and the tests run against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use super::types::{Participant, ParticipantFlag, ParticipantRole, Room, RoomSettings};
use crate::error::RoomError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoomRequest {
    pub name: String,
    pub host_id: String,
    pub max_participants: usize,
    pub settings: RoomSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRoomRequest {
    pub access_code: String,
    pub display_name: String,
    /// Stable user id; matching the room's host id grants the host role.
    pub user_id: Option<String>,
    pub password: Option<String>,
}

#[async_trait]
pub trait RoomService: Send + Sync {
    async fn create(&self, request: CreateRoomRequest) -> Result<Room, RoomError>;

    async fn join(&self, request: JoinRoomRequest) -> Result<(Room, Participant), RoomError>;

    async fn get(&self, room_id: &str) -> Result<Room, RoomError>;

    async fn leave(&self, room_id: &str, participant_id: &str) -> Result<(), RoomError>;

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, RoomError>;

    async fn set_locked(&self, room_id: &str, locked: bool) -> Result<Room, RoomError>;

    async fn set_participant_flag(
        &self,
        room_id: &str,
        participant_id: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<Participant, RoomError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct RoomEntry {
    room: Room,
    participants: HashMap<String, Participant>,
}

/// In-memory room service. Clones share the same rooms.
#[derive(Clone)]
pub struct LocalRoomService {
    rooms: Arc<RwLock<HashMap<String, RoomEntry>>>,
    expiry: Duration,
}

impl LocalRoomService {
    pub fn new(expiry_hours: u32) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            expiry: Duration::hours(i64::from(expiry_hours)),
        }
    }

    /// Shift a room's expiry, for exercising the expiry rule.
    pub async fn set_expiry(&self, room_id: &str, expires_at: chrono::DateTime<Utc>) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        entry.room.expires_at = expires_at;
        Ok(())
    }

    fn generate_access_code(existing: &HashMap<String, RoomEntry>) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code = format!("{:06}", rng.gen_range(0..1_000_000));
            if !existing.values().any(|e| e.room.access_code == code) {
                return code;
            }
        }
    }
}

impl Default for LocalRoomService {
    fn default() -> Self {
        Self::new(24)
    }
}

#[async_trait]
impl RoomService for LocalRoomService {
    async fn create(&self, request: CreateRoomRequest) -> Result<Room, RoomError> {
        let mut rooms = self.rooms.write().await;
        let now = Utc::now();
        let room = Room {
            id: huddle_common::new_id(),
            name: request.name,
            access_code: Self::generate_access_code(&rooms),
            host_id: request.host_id,
            max_participants: request.max_participants,
            participant_count: 0,
            created_at: now,
            expires_at: now + self.expiry,
            locked: false,
            settings: request.settings,
        };
        info!(room_id = %room.id, access_code = %room.access_code, "Room created");
        rooms.insert(
            room.id.clone(),
            RoomEntry {
                room: room.clone(),
                participants: HashMap::new(),
            },
        );
        Ok(room)
    }

    async fn join(&self, request: JoinRoomRequest) -> Result<(Room, Participant), RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .values_mut()
            .find(|e| e.room.access_code == request.access_code)
            .ok_or(RoomError::NotFound)?;
        let room = &mut entry.room;

        if room.locked {
            return Err(RoomError::Locked);
        }
        if room.is_full() {
            return Err(RoomError::Full {
                max: room.max_participants,
            });
        }
        if room.is_expired_at(Utc::now()) {
            return Err(RoomError::Expired);
        }
        if !room.settings.password_matches(request.password.as_deref()) {
            return Err(RoomError::IncorrectPassword);
        }

        let role = if request.user_id.as_deref() == Some(room.host_id.as_str()) {
            ParticipantRole::Host
        } else {
            ParticipantRole::Participant
        };
        let mut participant = Participant::new(huddle_common::new_id(), request.display_name, role);
        participant.audio_enabled = !room.settings.mute_on_join;

        entry
            .participants
            .insert(participant.participant_id.clone(), participant.clone());
        room.participant_count += 1;

        info!(
            room_id = %room.id,
            participant_id = %participant.participant_id,
            total = room.participant_count,
            "Participant joined room"
        );
        Ok((room.clone(), participant))
    }

    async fn get(&self, room_id: &str) -> Result<Room, RoomError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|e| e.room.clone())
            .ok_or(RoomError::NotFound)
    }

    async fn leave(&self, room_id: &str, participant_id: &str) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        entry
            .participants
            .remove(participant_id)
            .ok_or(RoomError::ParticipantNotFound)?;
        entry.room.participant_count = entry.room.participant_count.saturating_sub(1);

        if entry.room.participant_count == 0 {
            rooms.remove(room_id);
            info!(room_id = %room_id, "Empty room closed");
        }
        Ok(())
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, RoomError> {
        let rooms = self.rooms.read().await;
        let entry = rooms.get(room_id).ok_or(RoomError::NotFound)?;
        let mut list: Vec<Participant> = entry.participants.values().cloned().collect();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(list)
    }

    async fn set_locked(&self, room_id: &str, locked: bool) -> Result<Room, RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        entry.room.locked = locked;
        Ok(entry.room.clone())
    }

    async fn set_participant_flag(
        &self,
        room_id: &str,
        participant_id: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<Participant, RoomError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        if flag == ParticipantFlag::ScreenShare && value && !entry.room.settings.allow_screen_share {
            return Err(RoomError::ScreenShareDisabled);
        }
        let participant = entry
            .participants
            .get_mut(participant_id)
            .ok_or(RoomError::ParticipantNotFound)?;
        participant.set_flag(flag, value);
        participant.last_activity_at = Utc::now();
        Ok(participant.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(max: usize) -> CreateRoomRequest {
        CreateRoomRequest {
            name: "ABC123".into(),
            host_id: "user-alice".into(),
            max_participants: max,
            settings: RoomSettings::default(),
        }
    }

    fn join_request(code: &str, name: &str, user: Option<&str>) -> JoinRoomRequest {
        JoinRoomRequest {
            access_code: code.into(),
            display_name: name.into(),
            user_id: user.map(str::to_string),
            password: None,
        }
    }

    #[tokio::test]
    async fn create_generates_six_digit_code() {
        let service = LocalRoomService::default();
        let room = service.create(create_request(4)).await.unwrap();
        assert_eq!(room.access_code.len(), 6);
        assert!(room.access_code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(room.participant_count, 0);
        assert_eq!(room.expires_at - room.created_at, Duration::hours(24));
    }

    #[tokio::test]
    async fn host_role_follows_user_id() {
        let service = LocalRoomService::default();
        let room = service.create(create_request(4)).await.unwrap();
        let (_, alice) = service
            .join(join_request(&room.access_code, "Alice", Some("user-alice")))
            .await
            .unwrap();
        let (room, bob) = service
            .join(join_request(&room.access_code, "Bob", None))
            .await
            .unwrap();
        assert_eq!(alice.role, ParticipantRole::Host);
        assert_eq!(bob.role, ParticipantRole::Participant);
        assert_eq!(room.participant_count, 2);
    }

    #[tokio::test]
    async fn join_rules_are_checked_in_order() {
        let service = LocalRoomService::default();
        assert_eq!(
            service.join(join_request("000000", "X", None)).await.unwrap_err(),
            RoomError::NotFound
        );

        let room = service.create(create_request(1)).await.unwrap();
        service.set_locked(&room.id, true).await.unwrap();
        assert_eq!(
            service
                .join(join_request(&room.access_code, "X", None))
                .await
                .unwrap_err(),
            RoomError::Locked
        );

        service.set_locked(&room.id, false).await.unwrap();
        service
            .join(join_request(&room.access_code, "X", None))
            .await
            .unwrap();
        assert_eq!(
            service
                .join(join_request(&room.access_code, "Y", None))
                .await
                .unwrap_err(),
            RoomError::Full { max: 1 }
        );
    }

    #[tokio::test]
    async fn expired_room_rejects_join() {
        let service = LocalRoomService::default();
        let room = service.create(create_request(4)).await.unwrap();
        service
            .set_expiry(&room.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(
            service
                .join(join_request(&room.access_code, "Late", None))
                .await
                .unwrap_err(),
            RoomError::Expired
        );
    }

    #[tokio::test]
    async fn password_is_required_when_set() {
        let service = LocalRoomService::default();
        let mut request = create_request(4);
        request.settings = RoomSettings::default().with_password("s3cret");
        let room = service.create(request).await.unwrap();

        let mut join = join_request(&room.access_code, "Eve", None);
        join.password = Some("guess".into());
        assert_eq!(service.join(join.clone()).await.unwrap_err(), RoomError::IncorrectPassword);

        join.password = Some("s3cret".into());
        assert!(service.join(join).await.is_ok());
    }

    #[tokio::test]
    async fn mute_on_join_disables_audio() {
        let service = LocalRoomService::default();
        let mut request = create_request(4);
        request.settings.mute_on_join = true;
        let room = service.create(request).await.unwrap();
        let (_, p) = service
            .join(join_request(&room.access_code, "Quiet", None))
            .await
            .unwrap();
        assert!(!p.audio_enabled);
    }

    #[tokio::test]
    async fn last_leave_closes_room() {
        let service = LocalRoomService::default();
        let room = service.create(create_request(4)).await.unwrap();
        let (_, p) = service
            .join(join_request(&room.access_code, "Solo", None))
            .await
            .unwrap();
        service.leave(&room.id, &p.participant_id).await.unwrap();
        assert_eq!(service.get(&room.id).await.unwrap_err(), RoomError::NotFound);
    }

    #[tokio::test]
    async fn screen_share_gate() {
        let service = LocalRoomService::default();
        let mut request = create_request(4);
        request.settings.allow_screen_share = false;
        let room = service.create(request).await.unwrap();
        let (_, p) = service
            .join(join_request(&room.access_code, "Presenter", None))
            .await
            .unwrap();
        let err = service
            .set_participant_flag(&room.id, &p.participant_id, ParticipantFlag::ScreenShare, true)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::ScreenShareDisabled);

        let updated = service
            .set_participant_flag(&room.id, &p.participant_id, ParticipantFlag::HandRaised, true)
            .await
            .unwrap();
        assert!(updated.hand_raised);
    }
}
