//! Two-phase workflow: character first, then the story that uses it.
//!
//! [`Workflow`] is the single owner of the active job id and its latest
//! snapshot.  It submits jobs through the [`JobService`], drives one
//! [`JobPoller`], and applies poll events to its [`Phase`].  Events from a
//! loop that has been torn down or replaced are discarded, so a late
//! response for an abandoned job never overwrites fresher state.
//!
//! ```text
//! Character: AwaitingPrompt -> Generating -> Ready ----(proceed)----> Story: AwaitingStory
//!                 ^               |  |                                         |
//!                 +--(retry)------+  +--> Failed                               v
//!                                                              Running -> Finished
//!                                                                             |
//!            AwaitingPrompt <-----------------(start over)--------------------+
//! ```

use std::sync::Arc;

use cartoon_client::JobService;
use cartoon_core::job::validate_request;
use cartoon_core::stages::{story_pipeline, validate_stages};
use cartoon_core::{
    stage_view, CharacterRequest, CoreError, JobId, JobKind, JobSnapshot, JobStatus,
    StageDefinition, StageView, StoryRequest,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

use crate::config::PollIntervals;
use crate::error::WorkflowError;
use crate::events::{PollEvent, StopReason};
use crate::poller::JobPoller;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An approved character carried into the story phase.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedCharacter {
    pub job_id: JobId,
    pub prompt: String,
    /// The `character_image` artifact as delivered (a `data:` URL).
    pub image: String,
}

/// Sub-steps of the character phase.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacterStep {
    AwaitingPrompt,
    Generating {
        job_id: JobId,
        prompt: String,
        latest: Option<JobSnapshot>,
    },
    Ready(LinkedCharacter),
    Failed {
        job_id: JobId,
        prompt: String,
        message: String,
    },
}

/// Sub-steps of the story phase.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryStep {
    AwaitingStory,
    Running {
        job_id: JobId,
        latest: Option<JobSnapshot>,
    },
    /// The job reached `completed` or `failed`.
    Finished { job_id: JobId, snapshot: JobSnapshot },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Character(CharacterStep),
    Story {
        /// `None` when the character phase was skipped.
        character: Option<LinkedCharacter>,
        step: StoryStep,
    },
}

impl Phase {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Character(CharacterStep::AwaitingPrompt) => "awaiting a character prompt",
            Self::Character(CharacterStep::Generating { .. }) => "generating the character",
            Self::Character(CharacterStep::Ready(_)) => "the character is ready",
            Self::Character(CharacterStep::Failed { .. }) => "the character job has failed",
            Self::Story {
                step: StoryStep::AwaitingStory,
                ..
            } => "awaiting a story",
            Self::Story {
                step: StoryStep::Running { .. },
                ..
            } => "generating the story",
            Self::Story {
                step: StoryStep::Finished { .. },
                ..
            } => "the story job has finished",
        }
    }

    /// Job whose snapshots are currently accepted.
    pub fn tracked_job(&self) -> Option<&JobId> {
        match self {
            Self::Character(CharacterStep::Generating { job_id, .. })
            | Self::Story {
                step: StoryStep::Running { job_id, .. },
                ..
            } => Some(job_id),
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Character(CharacterStep::Failed { .. })
                | Self::Story {
                    step: StoryStep::Finished { .. },
                    ..
                }
        )
    }
}

/// What changed after applying a poll event.
#[derive(Debug, Clone)]
pub enum WorkflowUpdate {
    CharacterProgress(JobSnapshot),
    CharacterReady(LinkedCharacter),
    CharacterFailed {
        job_id: JobId,
        message: String,
    },
    StoryProgress {
        snapshot: JobSnapshot,
        stages: Vec<StageView>,
    },
    StoryCompleted {
        snapshot: JobSnapshot,
        stages: Vec<StageView>,
        download_url: String,
    },
    /// The service reported `failed`; `snapshot.message` holds the cause.
    StoryFailed {
        snapshot: JobSnapshot,
        stages: Vec<StageView>,
    },
    FetchFailed {
        job_id: JobId,
        tick: u64,
        error: String,
    },
    PollingStopped {
        job_id: JobId,
        reason: StopReason,
    },
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

pub struct Workflow {
    service: Arc<dyn JobService>,
    poller: JobPoller,
    events: Receiver<PollEvent>,
    stages: Vec<StageDefinition>,
    phase: Phase,
    last_progress: Option<u8>,
}

impl Workflow {
    pub fn new(service: Arc<dyn JobService>, intervals: PollIntervals) -> Self {
        let poller = JobPoller::new(Arc::clone(&service), intervals);
        let events = poller.subscribe();
        Self {
            service,
            poller,
            events,
            stages: story_pipeline(),
            phase: Phase::Character(CharacterStep::AwaitingPrompt),
            last_progress: None,
        }
    }

    /// Replace the displayed story pipeline.
    pub fn with_stages(mut self, stages: Vec<StageDefinition>) -> Result<Self, CoreError> {
        validate_stages(&stages)?;
        self.stages = stages;
        Ok(self)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// The approved character, in either phase.
    pub fn character(&self) -> Option<&LinkedCharacter> {
        match &self.phase {
            Phase::Character(CharacterStep::Ready(character)) => Some(character),
            Phase::Story { character, .. } => character.as_ref(),
            _ => None,
        }
    }

    /// Stage view of the story job's latest snapshot.
    pub fn stage_view(&self) -> Option<Vec<StageView>> {
        match &self.phase {
            Phase::Story {
                step:
                    StoryStep::Running {
                        latest: Some(snapshot),
                        ..
                    }
                    | StoryStep::Finished { snapshot, .. },
                ..
            } => Some(stage_view(&self.stages, snapshot)),
            _ => None,
        }
    }

    /// Download reference once the story job has completed.
    pub fn download_url(&self) -> Option<String> {
        match &self.phase {
            Phase::Story {
                step: StoryStep::Finished { job_id, snapshot },
                ..
            } if snapshot.status == JobStatus::Completed => {
                Some(self.service.download_url(job_id))
            }
            _ => None,
        }
    }

    // ---- actions ----

    /// Submit a character job and start polling it.
    ///
    /// On a submission error the step stays `AwaitingPrompt` and no poller
    /// is started.
    pub async fn submit_character(&mut self, prompt: &str) -> Result<JobId, WorkflowError> {
        if !matches!(self.phase, Phase::Character(CharacterStep::AwaitingPrompt)) {
            return Err(self.invalid("submit a character prompt"));
        }

        let request = CharacterRequest::new(prompt);
        validate_request(&request)?;

        let submitted = self.service.submit_character(&request).await?;
        let job_id = submitted.job_id;
        tracing::info!(job_id = %job_id, "Character job submitted");

        self.phase = Phase::Character(CharacterStep::Generating {
            job_id: job_id.clone(),
            prompt: request.prompt,
            latest: None,
        });
        self.track(job_id.clone(), JobKind::Character);

        Ok(job_id)
    }

    /// Discard the current character (or the attempt in flight) and go
    /// back to awaiting a prompt.
    pub fn retry_character(&mut self) -> Result<(), WorkflowError> {
        if !matches!(self.phase, Phase::Character(_)) {
            return Err(self.invalid("discard the character"));
        }

        self.poller.stop();
        self.last_progress = None;
        self.phase = Phase::Character(CharacterStep::AwaitingPrompt);
        tracing::info!("Character discarded, awaiting a new prompt");
        Ok(())
    }

    /// Move on to the story phase with the approved character.
    pub fn proceed_to_story(&mut self) -> Result<(), WorkflowError> {
        let Phase::Character(CharacterStep::Ready(character)) = &self.phase else {
            return Err(self.invalid("continue to the story"));
        };
        let character = character.clone();

        self.poller.stop();
        tracing::info!(character_job_id = %character.job_id, "Entering story phase");
        self.phase = Phase::Story {
            character: Some(character),
            step: StoryStep::AwaitingStory,
        };
        Ok(())
    }

    /// Go straight to the story phase without a character job.
    pub fn skip_character(&mut self) -> Result<(), WorkflowError> {
        if !matches!(self.phase, Phase::Character(CharacterStep::AwaitingPrompt)) {
            return Err(self.invalid("skip the character"));
        }

        tracing::info!("Entering story phase without a character");
        self.phase = Phase::Story {
            character: None,
            step: StoryStep::AwaitingStory,
        };
        Ok(())
    }

    /// Enter the story phase with a character generated earlier.
    ///
    /// The job is fetched once and must already carry its image.
    pub async fn adopt_character(&mut self, job_id: JobId) -> Result<(), WorkflowError> {
        if !matches!(self.phase, Phase::Character(CharacterStep::AwaitingPrompt)) {
            return Err(self.invalid("adopt an existing character"));
        }

        let snapshot = self.service.fetch_status(&job_id).await?;
        let Some(image) = snapshot.artifacts.character_image() else {
            return Err(WorkflowError::CharacterNotReady(job_id));
        };

        tracing::info!(character_job_id = %job_id, "Entering story phase with existing character");
        self.phase = Phase::Story {
            character: Some(LinkedCharacter {
                job_id,
                prompt: String::new(),
                image: image.to_string(),
            }),
            step: StoryStep::AwaitingStory,
        };
        Ok(())
    }

    /// Submit a story with default production options.
    pub async fn submit_story(&mut self, story: &str) -> Result<JobId, WorkflowError> {
        self.submit_story_request(StoryRequest::new(story)).await
    }

    /// Submit a story job and start polling it.
    ///
    /// The link to the approved character (if any) always comes from the
    /// workflow, overriding whatever `request.character_job_id` held.
    pub async fn submit_story_request(
        &mut self,
        mut request: StoryRequest,
    ) -> Result<JobId, WorkflowError> {
        let Phase::Story {
            character,
            step: StoryStep::AwaitingStory,
        } = &self.phase
        else {
            return Err(self.invalid("submit a story"));
        };

        request.story = request.story.trim().to_string();
        request.character_job_id = character.as_ref().map(|c| c.job_id.clone());
        validate_request(&request)?;

        let submitted = self.service.submit_story(&request).await?;
        let job_id = submitted.job_id;
        tracing::info!(
            job_id = %job_id,
            linked = request.character_job_id.is_some(),
            "Story job submitted",
        );

        if let Phase::Story { step, .. } = &mut self.phase {
            *step = StoryStep::Running {
                job_id: job_id.clone(),
                latest: None,
            };
        }
        self.track(job_id.clone(), JobKind::Story);

        Ok(job_id)
    }

    /// Clear everything and return to the character prompt.
    ///
    /// Only allowed once a job has reached a terminal outcome.
    pub fn start_over(&mut self) -> Result<(), WorkflowError> {
        if !self.phase.is_terminal() {
            return Err(self.invalid("start over"));
        }

        self.poller.stop();
        self.last_progress = None;
        self.phase = Phase::Character(CharacterStep::AwaitingPrompt);
        tracing::info!("Workflow reset");
        Ok(())
    }

    /// Stop polling (e.g. the consumer is going away).
    pub async fn shutdown(&mut self) {
        self.poller.shutdown().await;
    }

    // ---- events ----

    /// Wait for the next event that changes something.
    ///
    /// Returns `None` once nothing is being polled and every queued event
    /// has been consumed.
    pub async fn next_update(&mut self) -> Option<WorkflowUpdate> {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Poll events lagged; newer snapshots supersede");
                    continue;
                }
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {
                    if !self.poller.is_polling() {
                        // The loop publishes its last events before flipping
                        // its state, so drain once more after observing it.
                        match self.events.try_recv() {
                            Ok(event) => event,
                            Err(TryRecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Poll events lagged; newer snapshots supersede");
                                continue;
                            }
                            Err(_) => return None,
                        }
                    } else {
                        match self.events.recv().await {
                            Ok(event) => event,
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Poll events lagged; newer snapshots supersede");
                                continue;
                            }
                            Err(RecvError::Closed) => return None,
                        }
                    }
                }
            };

            if let Some(update) = self.apply(event) {
                return Some(update);
            }
        }
    }

    /// Apply one poll event.  Events from a replaced or abandoned loop are
    /// discarded and yield `None`.
    pub fn apply(&mut self, event: PollEvent) -> Option<WorkflowUpdate> {
        if !self.is_current(&event) {
            tracing::debug!(
                job_id = %event.job_id(),
                session = event.session(),
                "Discarding stale poll event",
            );
            return None;
        }

        match event {
            PollEvent::Snapshot { snapshot, .. } => {
                self.note_progress(&snapshot);
                let phase = std::mem::replace(
                    &mut self.phase,
                    Phase::Character(CharacterStep::AwaitingPrompt),
                );
                let (phase, update) = self.advance(phase, snapshot);
                self.phase = phase;
                update
            }
            PollEvent::FetchFailed {
                job_id,
                tick,
                error,
                ..
            } => Some(WorkflowUpdate::FetchFailed {
                job_id,
                tick,
                error,
            }),
            PollEvent::Stopped { job_id, reason, .. } => {
                Some(WorkflowUpdate::PollingStopped { job_id, reason })
            }
        }
    }

    // ---- private helpers ----

    fn track(&mut self, job_id: JobId, kind: JobKind) {
        self.last_progress = None;
        self.poller.start(job_id, kind);
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            action,
            state: self.phase.describe(),
        }
    }

    fn is_current(&self, event: &PollEvent) -> bool {
        if self.poller.session() != Some(event.session()) {
            return false;
        }
        match event {
            PollEvent::Stopped { .. } => true,
            _ => self.phase.tracked_job() == Some(event.job_id()),
        }
    }

    /// Progress should never go backwards; when it does the newer
    /// snapshot still wins.
    fn note_progress(&mut self, snapshot: &JobSnapshot) {
        if let Some(previous) = self.last_progress {
            if snapshot.progress_current < previous && snapshot.status != JobStatus::Failed {
                tracing::warn!(
                    job_id = %snapshot.job_id,
                    previous,
                    current = snapshot.progress_current,
                    "Job progress went backwards",
                );
            }
        }
        self.last_progress = Some(snapshot.progress_current);
    }

    fn advance(&self, phase: Phase, snapshot: JobSnapshot) -> (Phase, Option<WorkflowUpdate>) {
        match phase {
            Phase::Character(CharacterStep::Generating { job_id, prompt, .. }) => {
                if let Some(image) = snapshot.artifacts.character_image() {
                    let character = LinkedCharacter {
                        job_id,
                        prompt,
                        image: image.to_string(),
                    };
                    tracing::info!(job_id = %character.job_id, "Character ready");
                    (
                        Phase::Character(CharacterStep::Ready(character.clone())),
                        Some(WorkflowUpdate::CharacterReady(character)),
                    )
                } else if snapshot.is_terminal() {
                    let message = character_failure_message(&snapshot);
                    tracing::warn!(job_id = %job_id, message = %message, "Character job failed");
                    (
                        Phase::Character(CharacterStep::Failed {
                            job_id: job_id.clone(),
                            prompt,
                            message: message.clone(),
                        }),
                        Some(WorkflowUpdate::CharacterFailed { job_id, message }),
                    )
                } else {
                    (
                        Phase::Character(CharacterStep::Generating {
                            job_id,
                            prompt,
                            latest: Some(snapshot.clone()),
                        }),
                        Some(WorkflowUpdate::CharacterProgress(snapshot)),
                    )
                }
            }

            Phase::Story {
                character,
                step: StoryStep::Running { job_id, .. },
            } => {
                let stages = stage_view(&self.stages, &snapshot);
                match snapshot.status {
                    JobStatus::Completed => {
                        tracing::info!(job_id = %job_id, "Story job completed");
                        let download_url = self.service.download_url(&job_id);
                        (
                            Phase::Story {
                                character,
                                step: StoryStep::Finished {
                                    job_id,
                                    snapshot: snapshot.clone(),
                                },
                            },
                            Some(WorkflowUpdate::StoryCompleted {
                                snapshot,
                                stages,
                                download_url,
                            }),
                        )
                    }
                    JobStatus::Failed => {
                        tracing::warn!(
                            job_id = %job_id,
                            message = %snapshot.message,
                            "Story job failed",
                        );
                        (
                            Phase::Story {
                                character,
                                step: StoryStep::Finished {
                                    job_id,
                                    snapshot: snapshot.clone(),
                                },
                            },
                            Some(WorkflowUpdate::StoryFailed { snapshot, stages }),
                        )
                    }
                    JobStatus::Queued | JobStatus::Running => (
                        Phase::Story {
                            character,
                            step: StoryStep::Running {
                                job_id,
                                latest: Some(snapshot.clone()),
                            },
                        },
                        Some(WorkflowUpdate::StoryProgress { snapshot, stages }),
                    ),
                }
            }

            other => (other, None),
        }
    }
}

fn character_failure_message(snapshot: &JobSnapshot) -> String {
    match snapshot.status {
        JobStatus::Failed if !snapshot.message.is_empty() => snapshot.message.clone(),
        JobStatus::Failed => "Character generation failed".to_string(),
        _ => "Character job finished without an image".to_string(),
    }
}
