//! Unified error type for clipweave.
//!
//! All crates funnel their failures into [`Error`]. Every variant maps onto
//! exactly one [`ErrorCategory`], the coarse classification reported to
//! callers polling a job's status.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse failure category surfaced on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A clip has corrupt or zero-dimension media metadata.
    ClipUnreadable,
    /// A clip has no audio track and silence could not be synthesized.
    AudioStreamMissing,
    /// Another job is already writing the requested output path.
    JobAlreadyRunning,
    /// The engine exceeded its wall-clock budget and was killed.
    Timeout,
    /// The engine rejected an input as unreadable or corrupt.
    InputError,
    /// The engine does not support a codec or container.
    CodecError,
    /// The engine ran out of a system resource (disk, memory, handles).
    ResourceError,
    /// The caller cancelled the job.
    Cancelled,
    /// Anything that did not match a known pattern.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClipUnreadable => "ClipUnreadable",
            Self::AudioStreamMissing => "AudioStreamMissing",
            Self::JobAlreadyRunning => "JobAlreadyRunning",
            Self::Timeout => "Timeout",
            Self::InputError => "InputError",
            Self::CodecError => "CodecError",
            Self::ResourceError => "ResourceError",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Unified error type covering all failure modes in clipweave.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A clip could not be probed or reports unusable dimensions.
    #[error("clip {index} is unreadable ({}): {reason}", path.display())]
    ClipUnreadable {
        /// Position of the clip in the submitted ordering.
        index: usize,
        /// Path of the offending clip.
        path: PathBuf,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A clip lacks an audio track and the job cannot route silence for it.
    #[error("clip {index} has no audio stream ({}): {reason}", path.display())]
    AudioStreamMissing {
        /// Position of the clip in the submitted ordering.
        index: usize,
        /// Path of the offending clip.
        path: PathBuf,
        /// Why silence could not be substituted.
        reason: String,
    },

    /// A job targeting the same output path is still running.
    #[error("a job is already running for output {}", output.display())]
    JobAlreadyRunning {
        /// The contested output path.
        output: PathBuf,
    },

    /// The engine ran longer than its budget.
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),

    /// The job was cancelled by the caller.
    #[error("job cancelled")]
    Cancelled,

    /// The engine exited unsuccessfully; `category` is the classified cause.
    #[error("engine failed [{category}]: {diagnostic}")]
    Engine {
        /// Classified failure cause.
        category: ErrorCategory,
        /// Tail of the engine's diagnostic stream.
        diagnostic: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to the category reported on a failed job.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ClipUnreadable { .. } => ErrorCategory::ClipUnreadable,
            Error::AudioStreamMissing { .. } => ErrorCategory::AudioStreamMissing,
            Error::JobAlreadyRunning { .. } => ErrorCategory::JobAlreadyRunning,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Engine { category, .. } => *category,
            Error::Probe(_) => ErrorCategory::ClipUnreadable,
            Error::Validation(_)
            | Error::Io { .. }
            | Error::Tool { .. }
            | Error::Internal(_) => ErrorCategory::Unknown,
        }
    }

    /// Convenience constructor for [`Error::ClipUnreadable`].
    pub fn clip_unreadable(
        index: usize,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Error::ClipUnreadable {
            index,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::AudioStreamMissing`].
    pub fn audio_missing(index: usize, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::AudioStreamMissing {
            index,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Engine`].
    pub fn engine(category: ErrorCategory, diagnostic: impl Into<String>) -> Self {
        Error::Engine {
            category,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_unreadable_display() {
        let err = Error::clip_unreadable(2, "/clips/c.mp4", "zero width");
        assert_eq!(
            err.to_string(),
            "clip 2 is unreadable (/clips/c.mp4): zero width"
        );
        assert_eq!(err.category(), ErrorCategory::ClipUnreadable);
    }

    #[test]
    fn audio_missing_category() {
        let err = Error::audio_missing(0, "/clips/a.mp4", "policy is fail");
        assert_eq!(err.category(), ErrorCategory::AudioStreamMissing);
        assert!(err.to_string().contains("no audio stream"));
    }

    #[test]
    fn job_already_running_display() {
        let err = Error::JobAlreadyRunning {
            output: PathBuf::from("/out/final.mp4"),
        };
        assert_eq!(
            err.to_string(),
            "a job is already running for output /out/final.mp4"
        );
        assert_eq!(err.category(), ErrorCategory::JobAlreadyRunning);
    }

    #[test]
    fn engine_carries_its_category() {
        let err = Error::engine(ErrorCategory::CodecError, "Unknown encoder 'foo'");
        assert_eq!(err.category(), ErrorCategory::CodecError);
        assert_eq!(
            err.to_string(),
            "engine failed [CodecError]: Unknown encoder 'foo'"
        );
    }

    #[test]
    fn timeout_and_cancel() {
        assert_eq!(
            Error::Timeout(Duration::from_secs(5)).category(),
            ErrorCategory::Timeout
        );
        assert_eq!(Error::Cancelled.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn probe_error_is_unreadable_clip() {
        assert_eq!(
            Error::Probe("bad json".into()).category(),
            ErrorCategory::ClipUnreadable
        );
    }

    #[test]
    fn infrastructure_errors_are_unknown() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        assert_eq!(Error::from(io_err).category(), ErrorCategory::Unknown);
        assert_eq!(
            Error::tool("ffmpeg", "not found").category(),
            ErrorCategory::Unknown
        );
        assert_eq!(
            Error::Internal("boom".into()).category(),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn category_serializes_by_name() {
        let json = serde_json::to_string(&ErrorCategory::ResourceError).unwrap();
        assert_eq!(json, "\"ResourceError\"");
        let back: ErrorCategory = serde_json::from_str("\"Timeout\"").unwrap();
        assert_eq!(back, ErrorCategory::Timeout);
    }
}
