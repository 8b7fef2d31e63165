//! Domain model for the story-to-cartoon job client.
//!
//! - [`job`] -- job kinds, status snapshots, artifacts and request bodies.
//! - [`stages`] -- pure projection of a snapshot onto the production
//!   pipeline stages.
//! - [`image`] -- decoding of the inlined character image.
//! - [`config`] -- environment parsing helpers.

pub mod config;
pub mod error;
pub mod image;
pub mod job;
pub mod stages;
pub mod types;

pub use error::{ConfigError, CoreError};
pub use job::{
    Artifacts, CharacterRequest, JobKind, JobSnapshot, JobStatus, StoryRequest, SubmitResponse,
    VoiceConfig,
};
pub use stages::{infer_stages, stage_view, StageDefinition, StageState, StageTrigger, StageView};
pub use types::{JobId, Timestamp};
