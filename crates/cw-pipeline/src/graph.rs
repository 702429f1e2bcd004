//! Processing graph construction and rendering.
//!
//! [`GraphBuilder`] turns the ordered normalization plans into a typed
//! [`ProcessingGraph`]: one [`ClipStage`] per clip, in index order, followed
//! by a single [`JoinStage`]. The graph is rendered to an ffmpeg
//! `-filter_complex` description only at the edge, by [`ProcessingGraph::render`].
//!
//! Engine input `i` is always the clip with index `i`.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use cw_core::config::{MergeConfig, MissingAudioPolicy};
use cw_core::{ClipKind, Error, Geometry, Result};
use serde::Serialize;

use crate::normalize::{NormalizationPlan, ProbedClip};

/// Frame rates closer than this are considered equal.
const FRAME_RATE_TOLERANCE: f64 = 0.01;

/// Label of the joined video stream.
pub const JOINED_VIDEO: &str = "outv";
/// Label of the joined audio stream.
pub const JOINED_AUDIO: &str = "outa";

// ---------------------------------------------------------------------------
// IR
// ---------------------------------------------------------------------------

/// Where a clip's picture comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VideoSource {
    /// The first video stream of engine input `input`.
    Stream { input: usize },
    /// A still image looped for the configured image duration.
    Still { input: usize },
    /// A black canvas generated for `duration` (audio-only clips).
    Canvas { duration: Duration },
}

/// Where a clip's sound comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioSource {
    /// The first audio stream of engine input `input`.
    Stream { input: usize },
    /// Synthesized silence lasting `duration`.
    Silence { duration: Duration },
}

/// The per-clip normalization stage.
#[derive(Debug, Clone, Serialize)]
pub struct ClipStage {
    pub index: usize,
    pub kind: ClipKind,
    pub path: PathBuf,
    pub plan: NormalizationPlan,
    pub video: VideoSource,
    pub audio: AudioSource,
    pub video_label: String,
    pub audio_label: String,
}

/// How the normalized clips become the output streams.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JoinStage {
    /// A single clip: its normalized streams are mapped directly.
    Identity { video: String, audio: String },
    /// Two or more clips joined end to end.
    Concat {
        /// `(video, audio)` label pairs in index order.
        inputs: Vec<(String, String)>,
        video_out: String,
        audio_out: String,
    },
}

/// A complete, validated description of one merge.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingGraph {
    pub target: Geometry,
    pub stages: Vec<ClipStage>,
    pub join: JoinStage,
    pub sample_rate: u32,
    pub still_frame_rate: u32,
    pub image_duration: Duration,
    /// Non-fatal issues found while building (frame-rate mismatch, ...).
    pub warnings: Vec<String>,
}

impl ProcessingGraph {
    /// Labels that must be mapped to the output, video first.
    pub fn output_labels(&self) -> (&str, &str) {
        match &self.join {
            JoinStage::Identity { video, audio } => (video, audio),
            JoinStage::Concat {
                video_out,
                audio_out,
                ..
            } => (video_out, audio_out),
        }
    }

    /// `true` when more than one clip is joined.
    pub fn uses_join(&self) -> bool {
        matches!(self.join, JoinStage::Concat { .. })
    }

    /// Number of engine inputs (one per clip).
    pub fn input_count(&self) -> usize {
        self.stages.len()
    }

    /// Render the graph as an ffmpeg filter description.
    pub fn render(&self) -> String {
        let mut chains: Vec<String> = Vec::with_capacity(self.stages.len() * 2 + 1);

        for stage in &self.stages {
            chains.push(self.render_video(stage));
            chains.push(self.render_audio(stage));
        }

        if let JoinStage::Concat {
            inputs,
            video_out,
            audio_out,
        } = &self.join
        {
            let mut join = String::new();
            for (video, audio) in inputs {
                let _ = write!(join, "[{video}][{audio}]");
            }
            let _ = write!(
                join,
                "concat=n={}:v=1:a=1[{video_out}][{audio_out}]",
                inputs.len()
            );
            chains.push(join);
        }

        chains.join(";")
    }

    fn render_video(&self, stage: &ClipStage) -> String {
        let Geometry { width, height } = self.target;
        let fit = format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease:force_divisible_by=2,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
        );
        match &stage.video {
            VideoSource::Stream { input } | VideoSource::Still { input } => {
                format!("[{input}:v:0]{fit}[{}]", stage.video_label)
            }
            VideoSource::Canvas { duration } => format!(
                "color=c=black:s={width}x{height}:r={}:d={},setsar=1[{}]",
                self.still_frame_rate,
                seconds(*duration),
                stage.video_label
            ),
        }
    }

    fn render_audio(&self, stage: &ClipStage) -> String {
        let format = "aformat=sample_fmts=fltp:channel_layouts=stereo";
        match &stage.audio {
            AudioSource::Stream { input } => format!(
                "[{input}:a:0]aresample={},{format}[{}]",
                self.sample_rate, stage.audio_label
            ),
            AudioSource::Silence { duration } => format!(
                "anullsrc=r={}:cl=stereo,atrim=duration={},{format}[{}]",
                self.sample_rate,
                seconds(*duration),
                stage.audio_label
            ),
        }
    }
}

/// Seconds with millisecond precision, as the engine expects them.
pub(crate) fn seconds(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a [`ProcessingGraph`] from per-clip plans.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    target: Geometry,
    missing_audio: MissingAudioPolicy,
    sample_rate: u32,
    still_frame_rate: u32,
    image_duration: Duration,
}

impl GraphBuilder {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            target: config.geometry(),
            missing_audio: config.missing_audio,
            sample_rate: config.audio_sample_rate.max(1),
            still_frame_rate: config.still_frame_rate.max(1),
            image_duration: Duration::try_from_secs_f64(config.image_duration_secs)
                .unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Build the graph for `plans` and their `clips`.
    ///
    /// Both slices may arrive in any order; they are matched and emitted by
    /// clip index, which must form the contiguous range `0..n`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty job or mismatched plans.
    /// - [`Error::AudioStreamMissing`] when a video clip has no audio and
    ///   silence cannot be routed for it.
    /// - [`Error::ClipUnreadable`] when an audio-only clip has no duration.
    pub fn build(
        &self,
        plans: &[NormalizationPlan],
        clips: &[ProbedClip],
    ) -> Result<ProcessingGraph> {
        if clips.is_empty() {
            return Err(Error::Validation("a merge needs at least one clip".into()));
        }
        if plans.len() != clips.len() {
            return Err(Error::Validation(format!(
                "{} plans for {} clips",
                plans.len(),
                clips.len()
            )));
        }

        let mut plans: Vec<&NormalizationPlan> = plans.iter().collect();
        plans.sort_by_key(|p| p.index);
        let mut clips: Vec<&ProbedClip> = clips.iter().collect();
        clips.sort_by_key(|c| c.index());

        let mut stages = Vec::with_capacity(clips.len());
        let mut warnings = Vec::new();

        for (position, (plan, clip)) in plans.iter().zip(&clips).enumerate() {
            if plan.index != position || clip.index() != position {
                return Err(Error::Validation(format!(
                    "clip indices must be 0..{} without gaps; found plan {} and clip {} at position {position}",
                    clips.len(),
                    plan.index,
                    clip.index()
                )));
            }
            if plan.target() != self.target {
                return Err(Error::Validation(format!(
                    "plan {position} targets {} but the job targets {}",
                    plan.target(),
                    self.target
                )));
            }

            stages.push(self.stage(plan, clip, &mut warnings)?);
        }

        if let Some(warning) = frame_rate_warning(&clips) {
            tracing::warn!("{warning}");
            warnings.push(warning);
        }

        let join = if stages.len() == 1 {
            JoinStage::Identity {
                video: stages[0].video_label.clone(),
                audio: stages[0].audio_label.clone(),
            }
        } else {
            JoinStage::Concat {
                inputs: stages
                    .iter()
                    .map(|s| (s.video_label.clone(), s.audio_label.clone()))
                    .collect(),
                video_out: JOINED_VIDEO.to_string(),
                audio_out: JOINED_AUDIO.to_string(),
            }
        };

        tracing::debug!(
            clips = stages.len(),
            join = join_name(&join),
            warnings = warnings.len(),
            "graph built"
        );

        Ok(ProcessingGraph {
            target: self.target,
            stages,
            join,
            sample_rate: self.sample_rate,
            still_frame_rate: self.still_frame_rate,
            image_duration: self.image_duration,
            warnings,
        })
    }

    fn stage(
        &self,
        plan: &NormalizationPlan,
        clip: &ProbedClip,
        warnings: &mut Vec<String>,
    ) -> Result<ClipStage> {
        let index = plan.index;
        let path = clip.clip.path();

        let (video, audio) = match clip.kind {
            ClipKind::Video => {
                let audio = if clip.probe.has_audio {
                    AudioSource::Stream { input: index }
                } else {
                    self.silence_for(clip, warnings)?
                };
                (VideoSource::Stream { input: index }, audio)
            }
            ClipKind::Image => {
                if self.image_duration.is_zero() {
                    return Err(Error::Validation(format!(
                        "clip {index} is a still image but the image duration is zero"
                    )));
                }
                (
                    VideoSource::Still { input: index },
                    AudioSource::Silence {
                        duration: self.image_duration,
                    },
                )
            }
            ClipKind::Audio => {
                let duration = clip.probe.duration.filter(|d| !d.is_zero()).ok_or_else(|| {
                    Error::clip_unreadable(index, path, "audio clip has no known duration")
                })?;
                (
                    VideoSource::Canvas { duration },
                    AudioSource::Stream { input: index },
                )
            }
        };

        Ok(ClipStage {
            index,
            kind: clip.kind,
            path: path.to_path_buf(),
            plan: *plan,
            video,
            audio,
            video_label: format!("v{index}"),
            audio_label: format!("a{index}"),
        })
    }

    fn silence_for(&self, clip: &ProbedClip, warnings: &mut Vec<String>) -> Result<AudioSource> {
        let index = clip.index();
        let path = clip.clip.path();

        if self.missing_audio == MissingAudioPolicy::Fail {
            return Err(Error::audio_missing(
                index,
                path,
                "silence substitution is disabled",
            ));
        }

        let duration = clip.probe.duration.filter(|d| !d.is_zero()).ok_or_else(|| {
            Error::audio_missing(index, path, "duration unknown, cannot synthesize silence")
        })?;

        warnings.push(format!(
            "clip {index} ({}) has no audio; inserting {}s of silence",
            path.display(),
            seconds(duration)
        ));
        Ok(AudioSource::Silence { duration })
    }
}

fn join_name(join: &JoinStage) -> &'static str {
    match join {
        JoinStage::Identity { .. } => "identity",
        JoinStage::Concat { .. } => "concat",
    }
}

/// Describe a frame-rate mismatch between video clips, if there is one.
///
/// Mismatched rates are not reconciled; the joined stream takes its timing
/// from the engine's concat behaviour.
fn frame_rate_warning(clips: &[&ProbedClip]) -> Option<String> {
    let rates: Vec<(usize, f64)> = clips
        .iter()
        .filter(|c| c.kind == ClipKind::Video)
        .filter_map(|c| c.probe.frame_rate.map(|r| (c.index(), r)))
        .collect();

    let min = rates.iter().map(|(_, r)| *r).fold(f64::INFINITY, f64::min);
    let max = rates.iter().map(|(_, r)| *r).fold(f64::NEG_INFINITY, f64::max);
    if rates.len() < 2 || max - min <= FRAME_RATE_TOLERANCE {
        return None;
    }

    let listed: Vec<String> = rates
        .iter()
        .map(|(i, r)| format!("clip {i}: {r:.3} fps"))
        .collect();
    Some(format!(
        "clips have mismatched frame rates ({}); they are joined without frame-rate conversion",
        listed.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use cw_av::ClipProbe;
    use cw_core::ClipRef;

    fn probed(path: &str, index: usize, probe: ClipProbe) -> ProbedClip {
        ProbedClip::new(ClipRef::new(path, index), probe)
    }

    fn build(config: &MergeConfig, clips: &[ProbedClip]) -> Result<ProcessingGraph> {
        let plans: Vec<NormalizationPlan> = clips
            .iter()
            .map(|c| normalize(config.geometry(), c))
            .collect::<Result<_>>()?;
        GraphBuilder::new(config).build(&plans, clips)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn single_clip_is_identity() {
        let clips = [probed("a.mp4", 0, ClipProbe::video(1280, 720, secs(3)))];
        let graph = build(&MergeConfig::default(), &clips).unwrap();

        assert!(!graph.uses_join());
        assert_eq!(graph.output_labels(), ("v0", "a0"));
        let rendered = graph.render();
        assert!(!rendered.contains("concat"));
        assert!(rendered.starts_with("[0:v:0]scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(rendered.contains("pad=1920:1080:(ow-iw)/2:(oh-ih)/2"));
        assert!(rendered.contains("setsar=1[v0]"));
        assert!(rendered.contains("[0:a:0]aresample=48000"));
    }

    #[test]
    fn two_clips_concat_in_index_order() {
        let clips = [
            probed("a.mp4", 0, ClipProbe::video(1280, 720, secs(3))),
            probed("b.mp4", 1, ClipProbe::video(640, 480, secs(2))),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();

        assert!(graph.uses_join());
        assert_eq!(graph.output_labels(), ("outv", "outa"));
        assert!(graph
            .render()
            .ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn shuffled_slices_are_emitted_by_index() {
        let clips = [
            probed("c.mp4", 2, ClipProbe::video(640, 480, secs(1))),
            probed("a.mp4", 0, ClipProbe::video(640, 480, secs(1))),
            probed("b.mp4", 1, ClipProbe::video(640, 480, secs(1))),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();
        let paths: Vec<_> = graph.stages.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4"), PathBuf::from("c.mp4")]
        );
        assert!(graph.render().contains("[v0][a0][v1][a1][v2][a2]concat=n=3"));
    }

    #[test]
    fn gap_in_indices_is_rejected() {
        let clips = [
            probed("a.mp4", 0, ClipProbe::video(640, 480, secs(1))),
            probed("c.mp4", 2, ClipProbe::video(640, 480, secs(1))),
        ];
        let err = build(&MergeConfig::default(), &clips).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_job_is_rejected() {
        let err = GraphBuilder::new(&MergeConfig::default())
            .build(&[], &[])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_audio_gets_silence() {
        let clips = [
            probed("hd.mp4", 0, ClipProbe::video(1280, 720, secs(4))),
            probed("uhd.mp4", 1, ClipProbe::video(3840, 2160, secs(6)).without_audio()),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();

        assert_eq!(
            graph.stages[1].audio,
            AudioSource::Silence { duration: secs(6) }
        );
        let rendered = graph.render();
        assert!(rendered.contains("anullsrc=r=48000:cl=stereo,atrim=duration=6.000"));
        assert!(rendered.contains("[a1]"));
        assert_eq!(graph.warnings.len(), 1);
        assert!(graph.warnings[0].contains("no audio"));
    }

    #[test]
    fn missing_audio_fails_when_policy_says_so() {
        let config = MergeConfig {
            missing_audio: MissingAudioPolicy::Fail,
            ..MergeConfig::default()
        };
        let clips = [probed("mute.mp4", 0, ClipProbe::video(640, 480, secs(2)).without_audio())];
        let err = build(&config, &clips).unwrap_err();
        assert!(matches!(err, Error::AudioStreamMissing { index: 0, .. }));
    }

    #[test]
    fn missing_audio_without_duration_fails() {
        let mut probe = ClipProbe::video(640, 480, secs(2)).without_audio();
        probe.duration = None;
        let err = build(&MergeConfig::default(), &[probed("mute.mp4", 0, probe)]).unwrap_err();
        assert_eq!(err.category(), cw_core::ErrorCategory::AudioStreamMissing);
    }

    #[test]
    fn image_is_still_with_silence() {
        let clips = [
            probed("title.png", 0, ClipProbe::video(800, 600, secs(0)).without_audio()),
            probed("a.mp4", 1, ClipProbe::video(1920, 1080, secs(3))),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();
        assert_eq!(graph.stages[0].video, VideoSource::Still { input: 0 });
        assert_eq!(
            graph.stages[0].audio,
            AudioSource::Silence { duration: secs(5) }
        );
        assert!(graph.warnings.is_empty());
    }

    #[test]
    fn zero_image_duration_is_rejected() {
        let config = MergeConfig {
            image_duration_secs: 0.0,
            ..MergeConfig::default()
        };
        let clips = [
            probed("title.png", 0, ClipProbe::video(800, 600, secs(0)).without_audio()),
            probed("a.mp4", 1, ClipProbe::video(1920, 1080, secs(3))),
        ];
        let err = build(&config, &clips).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Without a still in the job the setting is never used.
        let clips = [probed("a.mp4", 0, ClipProbe::video(1920, 1080, secs(3)))];
        assert!(build(&config, &clips).is_ok());
    }

    #[test]
    fn audio_clip_gets_canvas() {
        let clips = [probed("song.mp3", 0, ClipProbe::audio(secs(12)))];
        let graph = build(&MergeConfig::default(), &clips).unwrap();
        let rendered = graph.render();
        assert!(rendered.starts_with("color=c=black:s=1920x1080:r=30:d=12.000,setsar=1[v0]"));
        assert!(rendered.contains("[0:a:0]aresample=48000"));
    }

    #[test]
    fn audio_clip_without_duration_is_unreadable() {
        let mut probe = ClipProbe::audio(secs(1));
        probe.duration = None;
        let err = build(&MergeConfig::default(), &[probed("song.mp3", 0, probe)]).unwrap_err();
        assert!(matches!(err, Error::ClipUnreadable { .. }));
    }

    #[test]
    fn frame_rate_mismatch_is_a_warning() {
        let clips = [
            probed("a.mp4", 0, ClipProbe::video(640, 480, secs(1)).with_frame_rate(30.0)),
            probed("b.mp4", 1, ClipProbe::video(640, 480, secs(1)).with_frame_rate(25.0)),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();
        assert_eq!(graph.warnings.len(), 1);
        assert!(graph.warnings[0].contains("mismatched frame rates"));
    }

    #[test]
    fn ntsc_rates_within_tolerance_do_not_warn() {
        let clips = [
            probed("a.mp4", 0, ClipProbe::video(640, 480, secs(1)).with_frame_rate(29.97)),
            probed("b.mp4", 1, ClipProbe::video(640, 480, secs(1)).with_frame_rate(29.975)),
        ];
        let graph = build(&MergeConfig::default(), &clips).unwrap();
        assert!(graph.warnings.is_empty());
    }

    #[test]
    fn custom_geometry_is_rendered() {
        let config = MergeConfig {
            width: 1280,
            height: 720,
            ..MergeConfig::default()
        };
        let clips = [probed("a.mp4", 0, ClipProbe::video(1920, 1080, secs(1)))];
        let rendered = build(&config, &clips).unwrap().render();
        assert!(rendered.contains("scale=1280:720:"));
        assert!(rendered.contains("pad=1280:720:"));
    }
}
