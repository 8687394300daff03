//! # comfy - job orchestration against a ComfyUI rendering service
//!
//! ```text
//! workflow.json ──▶ Workflow::patched ──▶ JobBackend::submit ──▶ job id
//!                                                              │
//!      local files ◀── ArtifactResolver ◀── CompletionPoller ◀──┘
//! ```
//!
//! Everything runs sequentially on the caller's task; no state outlives a
//! call except what the server keeps in its own history.

pub mod artifacts;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod poller;
pub mod record;

pub use artifacts::ArtifactResolver;
pub use client::{ComfyClient, JobBackend};
pub use config::ComfyConfig;
pub use error::{ComfyError, Result};
pub use graph::{
    patch, NodeBindings, SamplerSettings, Substitutions, Workflow, IMAGE_FILENAME_MARKER,
    NEGATIVE_PROMPT_MARKER, PROMPT_MARKER,
};
pub use pipeline::{execute, render_image, run_pipeline, RenderedImage};
pub use poller::{CompletionPoller, PollState};
pub use record::{ArtifactDescriptor, CompletionRecord, NodeOutput};
