//! FFprobe-based [`Prober`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into a [`ClipProbe`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ClipProbe, Prober};
use crate::command::ToolCommand;

/// Probing a single file should never take this long.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Create a prober that finds ffprobe on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe")
            .ok()
            .map(|p| Self { ffprobe_path: p })
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> cw_core::Result<ClipProbe> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(PROBE_TIMEOUT);
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await?;
        parse_ffprobe_json(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Map raw ffprobe JSON into a [`ClipProbe`].
///
/// Negative dimensions (seen on damaged headers) are clamped to 0 so the
/// normalizer rejects the clip instead of the parser.
pub fn parse_ffprobe_json(json: &str) -> cw_core::Result<ClipProbe> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| cw_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    // Cover art in audio files shows up as a one-frame video stream.
    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video") && s.disposition.attached_pic == 0);
    let has_audio = ff
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let dimension = |v: Option<i64>| v.and_then(|d| u32::try_from(d).ok()).unwrap_or(0);

    let duration = ff
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| video.and_then(|v| parse_seconds(v.duration.as_deref())));

    Ok(ClipProbe {
        width: dimension(video.and_then(|v| v.width)),
        height: dimension(video.and_then(|v| v.height)),
        has_video: video.is_some(),
        has_audio,
        frame_rate: video.and_then(|v| v.r_frame_rate.as_deref().and_then(parse_frame_rate)),
        duration,
    })
}

fn parse_seconds(s: Option<&str>) -> Option<Duration> {
    let secs: f64 = s?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Parse an ffprobe rate such as `"30000/1001"` or `"25"`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
