//! Clip probing.
//!
//! [`Prober`] is the seam between the merge pipeline and whatever inspects
//! media files. [`FfprobeProber`] is the production implementation; tests
//! substitute their own.

pub mod ffprobe;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::ffprobe::FfprobeProber;

/// What the pipeline needs to know about one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipProbe {
    /// Width of the primary video stream (0 when there is none).
    pub width: u32,
    /// Height of the primary video stream (0 when there is none).
    pub height: u32,
    /// Whether a real (non cover-art) video stream exists.
    pub has_video: bool,
    /// Whether at least one audio stream exists.
    pub has_audio: bool,
    /// Frame rate of the primary video stream.
    pub frame_rate: Option<f64>,
    /// Container duration, if known.
    pub duration: Option<Duration>,
}

impl ClipProbe {
    /// A video clip with the given geometry and an audio track.
    pub fn video(width: u32, height: u32, duration: Duration) -> Self {
        Self {
            width,
            height,
            has_video: true,
            has_audio: true,
            frame_rate: Some(30.0),
            duration: Some(duration),
        }
    }

    /// An audio-only clip.
    pub fn audio(duration: Duration) -> Self {
        Self {
            width: 0,
            height: 0,
            has_video: false,
            has_audio: true,
            frame_rate: None,
            duration: Some(duration),
        }
    }

    /// Builder: drop the audio track.
    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    /// Builder: override the frame rate.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }
}

/// Something that can inspect a media file.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Inspect `path`.
    async fn probe(&self, path: &Path) -> cw_core::Result<ClipProbe>;
}
