//! # rf-pipeline
//!
//! The transcoding job pipeline.
//!
//! This crate provides:
//!
//! - **[`TranscodeParams`]** -- the requested transformation, validated
//!   against the codec/container table, plus named [`presets`].
//! - **[`build_invocation`]** -- deterministic ffmpeg argument construction.
//! - **[`Transformer`]** trait -- the process-execution seam, with the
//!   ffmpeg-backed [`FfmpegTransformer`].
//! - **[`Job`]** -- job record and state machine, kept in a [`JobStore`].
//! - **[`Pipeline`]** -- `submit` / `status` / `cancel` over a bounded pool
//!   of concurrently running jobs.
//!
//! Enabling the `testing` feature exposes [`transformer::testing`], a
//! scripted transformer that never spawns a process.

pub mod invocation;
pub mod job;
pub mod params;
pub mod pipeline;
pub mod presets;
pub mod store;
pub mod transformer;

// Re-export key types at the crate root.
pub use invocation::{build_invocation, Invocation};
pub use job::{Job, JobFailure, JobStatus};
pub use params::{EncodeSpeed, Resolution, ScaleFit, TranscodeParams};
pub use pipeline::Pipeline;
pub use presets::Preset;
pub use store::JobStore;
pub use transformer::{ExitOutcome, FfmpegTransformer, RunEnd, Transformer};
