//! Clip-domain types: canonical geometry, clip kinds, and ordered clip
//! references.
//!
//! Enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    /// The default canonical output frame.
    pub const FULL_HD: Geometry = Geometry {
        width: 1920,
        height: 1080,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::FULL_HD
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// ClipKind
// ---------------------------------------------------------------------------

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv", "wmv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "flac", "ogg", "m4a", "wma"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

/// What a clip contributes to the joined stream.
///
/// Each variant has its own normalization strategy: video is scaled and
/// padded from its decoded stream, images are looped as a still, and audio
/// is laid over a synthesized blank canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Audio,
    Image,
}

impl ClipKind {
    /// Classify a path by extension (case-insensitive).
    ///
    /// Unknown or missing extensions are assumed to be video; probing
    /// decides whether the file is actually usable.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some(e) if AUDIO_EXTENSIONS.contains(&e) => Self::Audio,
            Some(e) if IMAGE_EXTENSIONS.contains(&e) => Self::Image,
            Some(e) if VIDEO_EXTENSIONS.contains(&e) => Self::Video,
            _ => Self::Video,
        }
    }

    /// Whether clips of this kind carry intrinsic pixel dimensions.
    pub fn has_intrinsic_geometry(self) -> bool {
        matches!(self, Self::Video | Self::Image)
    }
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Image => write!(f, "image"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClipRef
// ---------------------------------------------------------------------------

/// One element of a submitted clip sequence.
///
/// `index` is the clip's 0-based position in the caller's ordering and is
/// the only ordering key used when joining.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipRef {
    path: PathBuf,
    index: usize,
}

impl ClipRef {
    pub fn new(path: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            path: path.into(),
            index,
        }
    }

    /// Tag an ordered list of paths with their positions.
    pub fn sequence<I, P>(paths: I) -> Vec<ClipRef>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| ClipRef::new(path, index))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The kind implied by this clip's file extension.
    pub fn kind(&self) -> ClipKind {
        ClipKind::from_path(&self.path)
    }
}
