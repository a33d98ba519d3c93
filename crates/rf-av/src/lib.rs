//! # rf-av
//!
//! External tool management and process plumbing for the reelforge
//! pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder for running
//!   external processes, either captured with a timeout or streamed to the
//!   log until the process exits, is cancelled or runs out of time.
//! - **Workspace management** ([`JobWorkspace`]) -- per-job working
//!   directory with staging, publication and guaranteed cleanup.

pub mod command;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ProcessEnd, ToolCommand, ToolOutput};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::JobWorkspace;
