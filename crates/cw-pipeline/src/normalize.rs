//! Geometry normalization.
//!
//! [`normalize`] maps one probed clip onto the canonical frame: scale to fit
//! inside the box preserving aspect ratio, then pad to the exact box with the
//! picture centred. The result is a pure function of the target and the clip,
//! so a single-clip job is normalized exactly like an N-clip job.

use cw_av::ClipProbe;
use cw_core::{ClipKind, ClipRef, Error, Geometry, Result};
use serde::Serialize;

/// A clip together with what probing learned about it.
#[derive(Debug, Clone)]
pub struct ProbedClip {
    pub clip: ClipRef,
    /// Effective kind: the extension's kind, refined by the probe.
    pub kind: ClipKind,
    pub probe: ClipProbe,
}

impl ProbedClip {
    /// Pair a clip with its probe, refining the extension-derived kind.
    ///
    /// A "video" container holding only audio is treated as an audio clip.
    pub fn new(clip: ClipRef, probe: ClipProbe) -> Self {
        let kind = match clip.kind() {
            ClipKind::Video if !probe.has_video && probe.has_audio => ClipKind::Audio,
            other => other,
        };
        Self { clip, kind, probe }
    }

    pub fn index(&self) -> usize {
        self.clip.index()
    }
}

/// How one clip is brought to the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizationPlan {
    pub index: usize,
    pub kind: ClipKind,
    pub target_width: u32,
    pub target_height: u32,
    /// Predicted size after the aspect-preserving scale.
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_offset_x: u32,
    pub pad_offset_y: u32,
    /// Always 1:1 so players do not re-stretch letterboxed frames.
    pub sample_aspect_ratio: (u32, u32),
}

impl NormalizationPlan {
    pub fn target(&self) -> Geometry {
        Geometry::new(self.target_width, self.target_height)
    }

    /// `true` when the scaled picture does not fill the frame.
    pub fn is_padded(&self) -> bool {
        self.pad_offset_x > 0 || self.pad_offset_y > 0
    }
}

/// Produce the normalization plan for one clip.
///
/// # Errors
///
/// - [`Error::Validation`] if the target frame has a zero dimension.
/// - [`Error::ClipUnreadable`] if a video or image clip has no video stream
///   or reports a zero dimension.
pub fn normalize(target: Geometry, clip: &ProbedClip) -> Result<NormalizationPlan> {
    if target.width == 0 || target.height == 0 {
        return Err(Error::Validation(format!(
            "canonical geometry must be non-zero, got {target}"
        )));
    }

    let index = clip.index();

    let (scaled_width, scaled_height) = if clip.kind.has_intrinsic_geometry() {
        let probe = &clip.probe;
        if !probe.has_video {
            return Err(Error::clip_unreadable(
                index,
                clip.clip.path(),
                "no video stream",
            ));
        }
        if probe.width == 0 || probe.height == 0 {
            return Err(Error::clip_unreadable(
                index,
                clip.clip.path(),
                format!("invalid dimensions {}x{}", probe.width, probe.height),
            ));
        }
        fit_within(probe.width, probe.height, target)
    } else {
        // Audio clips get a blank canvas generated at the target size.
        (target.width, target.height)
    };

    Ok(NormalizationPlan {
        index,
        kind: clip.kind,
        target_width: target.width,
        target_height: target.height,
        scaled_width,
        scaled_height,
        pad_offset_x: (target.width - scaled_width) / 2,
        pad_offset_y: (target.height - scaled_height) / 2,
        sample_aspect_ratio: (1, 1),
    })
}

/// Largest even-sized box with the source's aspect ratio that fits `target`.
fn fit_within(width: u32, height: u32, target: Geometry) -> (u32, u32) {
    let (w, h) = (u64::from(width), u64::from(height));
    let (tw, th) = (u64::from(target.width), u64::from(target.height));

    let (sw, sh) = if w * th >= h * tw {
        (tw, (h * tw + w / 2) / w)
    } else {
        ((w * th + h / 2) / h, th)
    };

    (even_at_least_two(sw, tw), even_at_least_two(sh, th))
}

fn even_at_least_two(v: u64, limit: u64) -> u32 {
    let v = (v.min(limit) & !1).max(2.min(limit));
    u32::try_from(v).unwrap_or(u32::MAX)
}
