//! # cw-av
//!
//! External engine plumbing for the clipweave merge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   and cancellation support for running external processes.
//! - **Staging workspace** ([`Workspace`]) -- a hidden directory next to the
//!   output path; the staged file is promoted only once it is verified.
//! - **Probing** ([`probe::Prober`], [`probe::FfprobeProber`]) -- clip
//!   geometry, audio presence, frame rate, and duration.

pub mod command;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{RunOutcome, ToolCommand, ToolOutput, ToolRun};
pub use probe::{ClipProbe, FfprobeProber, Prober};
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::Workspace;
