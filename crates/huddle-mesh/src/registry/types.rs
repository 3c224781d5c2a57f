//! Room and participant model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::protocol::ParticipantInfo;

// ---------------------------------------------------------------------------
// Quality presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl VideoQuality {
    /// Capture resolution as `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VideoQuality::Low => (320, 240),
            VideoQuality::Medium => (640, 480),
            VideoQuality::High => (1280, 720),
            VideoQuality::Ultra => (1920, 1080),
        }
    }

    pub fn frame_rate(&self) -> u32 {
        match self {
            VideoQuality::Low => 15,
            VideoQuality::Medium => 24,
            VideoQuality::High => 30,
            VideoQuality::Ultra => 60,
        }
    }

    /// Target bitrate in bits per second.
    pub fn bitrate(&self) -> u32 {
        match self {
            VideoQuality::Low => 200_000,
            VideoQuality::Medium => 500_000,
            VideoQuality::High => 1_500_000,
            VideoQuality::Ultra => 4_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl AudioQuality {
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioQuality::Low => 8_000,
            AudioQuality::Medium => 16_000,
            AudioQuality::High => 48_000,
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            AudioQuality::High => 2,
            _ => 1,
        }
    }

    pub fn bitrate(&self) -> u32 {
        match self {
            AudioQuality::Low => 32_000,
            AudioQuality::Medium => 64_000,
            AudioQuality::High => 128_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub allow_screen_share: bool,
    pub allow_chat: bool,
    pub require_password: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub mute_on_join: bool,
    pub video_quality: VideoQuality,
    pub audio_quality: AudioQuality,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            allow_screen_share: true,
            allow_chat: true,
            require_password: false,
            password_hash: None,
            mute_on_join: false,
            video_quality: VideoQuality::default(),
            audio_quality: AudioQuality::default(),
        }
    }
}

impl RoomSettings {
    pub fn with_password(mut self, password: &str) -> Self {
        self.require_password = true;
        self.password_hash = Some(hash_password(password));
        self
    }

    pub fn password_matches(&self, password: Option<&str>) -> bool {
        if !self.require_password {
            return true;
        }
        match (&self.password_hash, password) {
            (Some(expected), Some(given)) => *expected == hash_password(given),
            _ => false,
        }
    }
}

/// SHA-256 hex digest of a room password.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub access_code: String,
    pub host_id: String,
    pub max_participants: usize,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub locked: bool,
    pub settings: RoomSettings,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.participant_count >= self.max_participants
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: String,
    pub display_name: String,
    pub role: ParticipantRole,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub hand_raised: bool,
    /// 0-100, see [`crate::registry::connection_quality`].
    pub connection_quality: u8,
    pub joined_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>, role: ParticipantRole) -> Self {
        let now = Utc::now();
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            role,
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
            hand_raised: false,
            connection_quality: 100,
            joined_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == ParticipantRole::Host
    }

    pub fn from_info(info: &ParticipantInfo) -> Self {
        let role = if info.is_host {
            ParticipantRole::Host
        } else {
            ParticipantRole::Participant
        };
        let mut participant = Self::new(&info.participant_id, &info.participant_name, role);
        participant.audio_enabled = info.audio_enabled;
        participant.video_enabled = info.video_enabled;
        participant.screen_sharing = info.screen_sharing;
        participant.hand_raised = info.hand_raised;
        participant
    }

    pub fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.participant_id.clone(),
            participant_name: self.display_name.clone(),
            is_host: self.is_host(),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            screen_sharing: self.screen_sharing,
            hand_raised: self.hand_raised,
        }
    }

    pub fn flag(&self, flag: ParticipantFlag) -> bool {
        match flag {
            ParticipantFlag::Audio => self.audio_enabled,
            ParticipantFlag::Video => self.video_enabled,
            ParticipantFlag::ScreenShare => self.screen_sharing,
            ParticipantFlag::HandRaised => self.hand_raised,
        }
    }

    pub fn set_flag(&mut self, flag: ParticipantFlag, value: bool) {
        match flag {
            ParticipantFlag::Audio => self.audio_enabled = value,
            ParticipantFlag::Video => self.video_enabled = value,
            ParticipantFlag::ScreenShare => self.screen_sharing = value,
            ParticipantFlag::HandRaised => self.hand_raised = value,
        }
    }
}

/// Announced capability flags of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantFlag {
    Audio,
    Video,
    ScreenShare,
    HandRaised,
}

impl ParticipantFlag {
    pub const ALL: [ParticipantFlag; 4] = [
        ParticipantFlag::Audio,
        ParticipantFlag::Video,
        ParticipantFlag::ScreenShare,
        ParticipantFlag::HandRaised,
    ];
}
