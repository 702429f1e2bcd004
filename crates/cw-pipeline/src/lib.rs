//! # cw-pipeline
//!
//! The clip normalization and concatenation pipeline.
//!
//! This crate provides:
//!
//! - **Geometry normalizer** ([`normalize`]) -- per-clip fit-and-pad plan
//!   into the canonical frame.
//! - **Graph builder** ([`GraphBuilder`]) -- a typed [`ProcessingGraph`] of
//!   per-clip stages plus one join (or identity) stage, rendered to an
//!   ffmpeg filter graph and [`EngineInvocation`].
//! - **Job executor** ([`JobExecutor`]) -- runs the engine exactly once per
//!   job with timeout, cancellation, per-output exclusion ([`JobRegistry`]),
//!   exit classification ([`classify_diagnostic`]), and verified promotion
//!   of the output file.

pub mod classify;
pub mod executor;
pub mod graph;
pub mod invocation;
pub mod job;
pub mod normalize;
pub mod registry;

// Re-export key types at the crate root.
pub use classify::classify_diagnostic;
pub use executor::{JobExecutor, JobHandle, MergePlan, MAX_RETAINED_JOBS};
pub use graph::{AudioSource, ClipStage, GraphBuilder, JoinStage, ProcessingGraph, VideoSource};
pub use invocation::EngineInvocation;
pub use job::{Job, JobFailure, JobState};
pub use normalize::{normalize, NormalizationPlan, ProbedClip};
pub use registry::{JobRegistry, OutputLease};
