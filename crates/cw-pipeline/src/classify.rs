//! Engine failure classification.
//!
//! Best-effort matching of known ffmpeg diagnostics onto an
//! [`ErrorCategory`]. Resource exhaustion is checked first because a full
//! disk often also produces secondary codec or I/O complaints.

use cw_core::ErrorCategory;

const RESOURCE_PATTERNS: &[&str] = &[
    "no space left on device",
    "cannot allocate memory",
    "disk quota exceeded",
    "too many open files",
    "out of memory",
];

const CODEC_PATTERNS: &[&str] = &[
    "unknown encoder",
    "encoder not found",
    "decoder not found",
    "unsupported codec",
    "not currently supported",
    "could not find tag for codec",
    "unable to find a suitable output format",
    "error while opening encoder",
];

const INPUT_PATTERNS: &[&str] = &[
    "no such file or directory",
    "invalid data found when processing input",
    "moov atom not found",
    "error while decoding",
    "could not find codec parameters",
    "permission denied",
];

/// How many trailing lines [`diagnostic_excerpt`] keeps.
const EXCERPT_LINES: usize = 20;

/// Classify an engine's diagnostic output. Unmatched text is
/// [`ErrorCategory::Unknown`].
pub fn classify_diagnostic(stderr: &str) -> ErrorCategory {
    let lower = stderr.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(RESOURCE_PATTERNS) {
        ErrorCategory::ResourceError
    } else if matches(CODEC_PATTERNS) {
        ErrorCategory::CodecError
    } else if matches(INPUT_PATTERNS) {
        ErrorCategory::InputError
    } else {
        ErrorCategory::Unknown
    }
}

/// The last few non-empty lines of a diagnostic stream.
pub fn diagnostic_excerpt(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(EXCERPT_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors() {
        assert_eq!(
            classify_diagnostic("/clips/a.mp4: Invalid data found when processing input"),
            ErrorCategory::InputError
        );
        assert_eq!(
            classify_diagnostic("[mov,mp4,m4a] moov atom not found"),
            ErrorCategory::InputError
        );
        assert_eq!(
            classify_diagnostic("/gone.mp4: No such file or directory"),
            ErrorCategory::InputError
        );
    }

    #[test]
    fn codec_errors() {
        assert_eq!(
            classify_diagnostic("Unknown encoder 'libx264'"),
            ErrorCategory::CodecError
        );
        assert_eq!(
            classify_diagnostic("Could not find tag for codec pcm_s16le in stream #0"),
            ErrorCategory::CodecError
        );
    }

    #[test]
    fn resource_errors_win() {
        let stderr = "av_interleaved_write_frame(): No space left on device\n\
                      Error while decoding stream #0:0";
        assert_eq!(classify_diagnostic(stderr), ErrorCategory::ResourceError);
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(classify_diagnostic(""), ErrorCategory::Unknown);
        assert_eq!(
            classify_diagnostic("Conversion failed!"),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn excerpt_keeps_tail() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n\n")).collect();
        let excerpt = diagnostic_excerpt(&stderr);
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), EXCERPT_LINES);
        assert_eq!(lines[0], "line 30");
        assert_eq!(lines[EXCERPT_LINES - 1], "line 49");
    }
}
