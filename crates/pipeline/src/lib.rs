//! Job orchestration for the story-to-cartoon client.
//!
//! - [`poller`] -- one cancellable polling loop per active job.
//! - [`workflow`] -- the character → story state machine that owns the
//!   poller and applies its events.
//! - [`events`] -- what pollers publish.
//! - [`config`] -- poll intervals per job kind.

pub mod config;
pub mod error;
pub mod events;
pub mod poller;
pub mod workflow;

pub use config::PollIntervals;
pub use error::WorkflowError;
pub use events::{PollEvent, StopReason};
pub use poller::{JobPoller, PollerState};
pub use workflow::{CharacterStep, LinkedCharacter, Phase, StoryStep, Workflow, WorkflowUpdate};
