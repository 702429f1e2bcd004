//! The single engine command line for a job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cw_av::ToolCommand;

use crate::graph::{seconds, ProcessingGraph, VideoSource};

/// Fixed encoder settings appended to every invocation.
const ENCODER_ARGS: &[&str] = &[
    "-c:v", "libx264",
    "-preset", "veryfast",
    "-crf", "23",
    "-pix_fmt", "yuv420p",
    "-c:a", "aac",
    "-b:a", "192k",
    "-movflags", "+faststart",
];

/// A fully rendered engine command line.
///
/// Arguments are ordered as: global flags, one `-i` per clip in index
/// order, the filter graph, the output mapping (video then audio), the
/// encoder settings, and finally the output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    args: Vec<String>,
    output: PathBuf,
}

impl EngineInvocation {
    /// Build the command line that renders `graph` into `output`.
    pub fn new(graph: &ProcessingGraph, output: &Path) -> Self {
        let mut args: Vec<String> = ["-hide_banner", "-nostats", "-y"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for stage in &graph.stages {
            if let VideoSource::Still { .. } = stage.video {
                args.extend([
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    graph.still_frame_rate.to_string(),
                    "-t".to_string(),
                    seconds(graph.image_duration),
                ]);
            }
            args.push("-i".to_string());
            args.push(stage.path.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_string());
        args.push(graph.render());

        let (video, audio) = graph.output_labels();
        args.extend([
            "-map".to_string(),
            format!("[{video}]"),
            "-map".to_string(),
            format!("[{audio}]"),
        ]);

        args.extend(ENCODER_ARGS.iter().map(|s| s.to_string()));
        args.push(output.to_string_lossy().into_owned());

        Self {
            args,
            output: output.to_path_buf(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Where the engine will write.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The invocation as a [`ToolCommand`] for `engine`.
    pub fn command(&self, engine: &Path, timeout: Duration) -> ToolCommand {
        let mut cmd = ToolCommand::new(engine.to_path_buf());
        cmd.args(self.args.iter().cloned()).timeout(timeout);
        cmd
    }

    /// Shell-like rendering for logs and dry runs.
    pub fn display(&self, engine: &Path) -> String {
        let mut line = engine.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == ';' || c == '[') {
                line.push('\'');
                line.push_str(&arg.replace('\'', r"'\''"));
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}
