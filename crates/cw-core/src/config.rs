//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! tool overrides and the merge settings. Every section defaults sensibly so
//! a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::Geometry;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub merge: MergeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let merge = &self.merge;

        if merge.width == 0 || merge.height == 0 {
            warnings.push(format!(
                "merge geometry {}x{} has a zero dimension",
                merge.width, merge.height
            ));
        }
        if merge.width % 2 != 0 || merge.height % 2 != 0 {
            warnings.push(format!(
                "merge geometry {}x{} is not even; yuv420p output requires even dimensions",
                merge.width, merge.height
            ));
        }
        if merge.timeout_secs == 0 {
            warnings.push("merge.timeout_secs is 0; every job will time out".into());
        }
        if merge.audio_sample_rate == 0 {
            warnings.push("merge.audio_sample_rate is 0".into());
        }
        if merge.still_frame_rate == 0 {
            warnings.push("merge.still_frame_rate is 0".into());
        }
        if !(merge.image_duration_secs > 0.0) {
            warnings.push(format!(
                "merge.image_duration_secs must be positive (got {})",
                merge.image_duration_secs
            ));
        }

        for (name, path) in [
            ("ffmpeg_path", self.tools.ffmpeg_path.as_deref()),
            ("ffprobe_path", self.tools.ffprobe_path.as_deref()),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; PATH will be searched",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// What to do with a clip that has no audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAudioPolicy {
    /// Route a synthesized silent track for the clip's duration.
    #[default]
    Silence,
    /// Fail the job with `AudioStreamMissing`.
    Fail,
}

/// Merge job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Canonical output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Canonical output height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Wall-clock budget for one engine run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub missing_audio: MissingAudioPolicy,
    #[serde(default = "default_sample_rate")]
    pub audio_sample_rate: u32,
    /// Frame rate for stills and blank canvases behind audio-only clips.
    #[serde(default = "default_still_frame_rate")]
    pub still_frame_rate: u32,
    /// How long each image clip is shown.
    #[serde(default = "default_image_duration")]
    pub image_duration_secs: f64,
}

fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_timeout_secs() -> u64 {
    3600
}
fn default_sample_rate() -> u32 {
    48_000
}
fn default_still_frame_rate() -> u32 {
    30
}
fn default_image_duration() -> f64 {
    5.0
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            timeout_secs: default_timeout_secs(),
            missing_audio: MissingAudioPolicy::default(),
            audio_sample_rate: default_sample_rate(),
            still_frame_rate: default_still_frame_rate(),
            image_duration_secs: default_image_duration(),
        }
    }
}

impl MergeConfig {
    /// The canonical frame every clip is normalized into.
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
