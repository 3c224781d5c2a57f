//! Local media capture boundary and stream refcounting.
//!
//! A captured stream is shared read-only by the local preview and every
//! peer link. Tracks are stopped on the source once the last holder lets
//! go of its [`LocalStream`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MediaError;
use crate::registry::{AudioQuality, RoomSettings, VideoQuality};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Camera,
    Screen,
}

/// Opaque handle to a captured or received media stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle {
    pub id: String,
    pub kind: StreamKind,
}

impl StreamHandle {
    pub fn new(id: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub audio_bitrate: u32,
}

impl MediaConstraints {
    pub fn from_quality(video: VideoQuality, audio: AudioQuality) -> Self {
        let (width, height) = video.resolution();
        Self {
            audio: true,
            video: true,
            width,
            height,
            frame_rate: video.frame_rate(),
            video_bitrate: video.bitrate(),
            sample_rate: audio.sample_rate(),
            channels: audio.channels(),
            audio_bitrate: audio.bitrate(),
        }
    }
}

impl From<&RoomSettings> for MediaConstraints {
    fn from(settings: &RoomSettings) -> Self {
        Self::from_quality(settings.video_quality, settings.audio_quality)
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::from_quality(VideoQuality::default(), AudioQuality::default())
    }
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(&self, constraints: MediaConstraints) -> Result<StreamHandle, MediaError>;

    async fn capture_screen(&self) -> Result<StreamHandle, MediaError>;

    /// Stop every track of a stream. Called exactly once per capture.
    fn stop(&self, handle: &StreamHandle);
}

// ---------------------------------------------------------------------------
// Shared local stream
// ---------------------------------------------------------------------------

struct Captured {
    handle: StreamHandle,
    source: Arc<dyn MediaSource>,
}

impl Drop for Captured {
    fn drop(&mut self) {
        debug!(stream_id = %self.handle.id, "Last holder released local stream, stopping tracks");
        self.source.stop(&self.handle);
    }
}

/// Refcounted local stream. Clone to share, drop to release.
#[derive(Clone)]
pub struct LocalStream {
    inner: Arc<Captured>,
}

impl LocalStream {
    pub fn new(handle: StreamHandle, source: Arc<dyn MediaSource>) -> Self {
        Self {
            inner: Arc::new(Captured { handle, source }),
        }
    }

    pub fn handle(&self) -> &StreamHandle {
        &self.inner.handle
    }

    /// Number of live holders (preview plus attached links).
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStream")
            .field("handle", &self.inner.handle)
            .field("holders", &self.holders())
            .finish()
    }
}
