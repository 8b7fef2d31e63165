//! Drives a [`Workflow`] from the terminal.
//!
//! Prints every new snapshot with its stage view, saves the character
//! image and downloads the finished video.  Cancelling the runner's
//! shutdown token (wired to `Ctrl-C` by the binary) tears the active
//! poller down before returning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cartoon_client::{JobService, JobServiceApi};
use cartoon_core::image::CharacterImage;
use cartoon_core::{JobId, StageView};
use cartoon_pipeline::{LinkedCharacter, Workflow, WorkflowUpdate};
use tokio_util::sync::CancellationToken;

use crate::args::{Command, StoryInput};
use crate::config::CliConfig;
use crate::render::{render_stages, render_status};

/// Exit code for a job the service reported as failed.
pub const EXIT_JOB_FAILED: i32 = 2;
/// Exit code after `Ctrl-C`.
pub const EXIT_INTERRUPTED: i32 = 130;

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    CharacterSaved { job_id: JobId, path: PathBuf },
    VideoSaved { job_id: JobId, path: PathBuf },
    Failed { job_id: JobId, message: String },
    Interrupted,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CharacterSaved { .. } | Self::VideoSaved { .. } => 0,
            Self::Failed { .. } => EXIT_JOB_FAILED,
            Self::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Where a phase of the workflow ended.
enum Finish {
    Character(LinkedCharacter),
    Video(JobId),
    Failed { job_id: JobId, message: String },
    Interrupted,
}

pub struct Runner {
    api: Arc<JobServiceApi>,
    workflow: Workflow,
    output_dir: PathBuf,
    shutdown: CancellationToken,
    last_line: Option<String>,
}

impl Runner {
    pub fn new(config: &CliConfig) -> anyhow::Result<Self> {
        let api = Arc::new(
            JobServiceApi::new(&config.client).context("Failed to build the HTTP client")?,
        );
        let service: Arc<dyn JobService> = api.clone();
        Ok(Self {
            api,
            workflow: Workflow::new(service, config.intervals),
            output_dir: config.output_dir.clone(),
            shutdown: CancellationToken::new(),
            last_line: None,
        })
    }

    /// Token that interrupts the running command when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Probe the service once before submitting anything.
    pub async fn check_health(&self) -> anyhow::Result<()> {
        let health = self
            .api
            .health_check()
            .await
            .with_context(|| format!("Job service at {} is not reachable", self.api.base_url()))?;
        tracing::info!(message = %health.message, "Job service is up");
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> anyhow::Result<Outcome> {
        match command {
            Command::Character { prompt } => match self.character_phase(&prompt).await? {
                Finish::Character(character) => self.save_character(&character).await,
                other => self.conclude(other).await,
            },
            Command::Story { character, story } => {
                let story = load_story(&story).await?;
                match character {
                    Some(job_id) => self.workflow.adopt_character(job_id).await?,
                    None => self.workflow.skip_character()?,
                }
                let finish = self.story_phase(&story).await?;
                self.conclude(finish).await
            }
            Command::Run { prompt, story } => {
                let story = load_story(&story).await?;
                match self.character_phase(&prompt).await? {
                    Finish::Character(character) => {
                        self.save_character(&character).await?;
                    }
                    other => return self.conclude(other).await,
                }
                self.workflow.proceed_to_story()?;
                let finish = self.story_phase(&story).await?;
                self.conclude(finish).await
            }
            Command::Help => anyhow::bail!("help is handled before the runner starts"),
        }
    }

    // ---- phases ----

    async fn character_phase(&mut self, prompt: &str) -> anyhow::Result<Finish> {
        let job_id = self.workflow.submit_character(prompt).await?;
        println!("Character job {} submitted", job_id.short());
        self.drive().await
    }

    async fn story_phase(&mut self, story: &str) -> anyhow::Result<Finish> {
        let job_id = self.workflow.submit_story(story).await?;
        println!("Story job {} submitted", job_id.short());
        self.drive().await
    }

    /// Consume updates until the current job reaches an outcome.
    async fn drive(&mut self) -> anyhow::Result<Finish> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                update = self.workflow.next_update() => Some(update),
            };

            let Some(update) = next else {
                tracing::warn!("Interrupted, tearing down poller");
                self.workflow.shutdown().await;
                return Ok(Finish::Interrupted);
            };

            let Some(update) = update else {
                anyhow::bail!("Polling ended before the job reached an outcome");
            };

            match update {
                WorkflowUpdate::CharacterProgress(snapshot) => {
                    self.print_line(render_status(&snapshot));
                }
                WorkflowUpdate::CharacterReady(character) => {
                    println!("Character ready");
                    return Ok(Finish::Character(character));
                }
                WorkflowUpdate::CharacterFailed { job_id, message } => {
                    return Ok(Finish::Failed { job_id, message });
                }
                WorkflowUpdate::StoryProgress { snapshot, stages } => {
                    self.print_progress(render_status(&snapshot), &stages);
                }
                WorkflowUpdate::StoryCompleted {
                    snapshot, stages, ..
                } => {
                    self.print_progress(render_status(&snapshot), &stages);
                    return Ok(Finish::Video(snapshot.job_id));
                }
                WorkflowUpdate::StoryFailed { snapshot, stages } => {
                    self.print_progress(render_status(&snapshot), &stages);
                    let message = if snapshot.message.is_empty() {
                        "Story generation failed".to_string()
                    } else {
                        snapshot.message
                    };
                    return Ok(Finish::Failed {
                        job_id: snapshot.job_id,
                        message,
                    });
                }
                WorkflowUpdate::FetchFailed { tick, .. } => {
                    tracing::debug!(tick, "Status check missed, waiting for next tick");
                }
                WorkflowUpdate::PollingStopped { .. } => {}
            }
        }
    }

    async fn conclude(&mut self, finish: Finish) -> anyhow::Result<Outcome> {
        match finish {
            Finish::Character(character) => self.save_character(&character).await,
            Finish::Video(job_id) => self.save_video(job_id).await,
            Finish::Failed { job_id, message } => {
                eprintln!("Job {} failed: {message}", job_id.short());
                Ok(Outcome::Failed { job_id, message })
            }
            Finish::Interrupted => Ok(Outcome::Interrupted),
        }
    }

    // ---- output ----

    async fn save_character(&self, character: &LinkedCharacter) -> anyhow::Result<Outcome> {
        let image = CharacterImage::from_data_url(&character.image)
            .context("Character image could not be decoded")?;
        let path = output_path(
            &self.output_dir,
            &format!("character_{}.{}", character.job_id, image.extension()),
        );
        write_file(&path, &image.bytes).await?;

        println!("Character saved to {}", path.display());
        Ok(Outcome::CharacterSaved {
            job_id: character.job_id.clone(),
            path,
        })
    }

    async fn save_video(&self, job_id: JobId) -> anyhow::Result<Outcome> {
        let bytes = self
            .api
            .download_video(&job_id)
            .await
            .with_context(|| format!("Failed to download video from {}", self.api.video_url(&job_id)))?;
        let path = output_path(&self.output_dir, &format!("cartoon_{job_id}.mp4"));
        write_file(&path, &bytes).await?;

        println!("Video saved to {}", path.display());
        Ok(Outcome::VideoSaved { job_id, path })
    }

    fn print_progress(&mut self, status: String, stages: &[StageView]) {
        if self.print_line(status) {
            println!("{}", render_stages(stages));
        }
    }

    /// Print `line` unless it repeats the previous one.
    fn print_line(&mut self, line: String) -> bool {
        if self.last_line.as_deref() == Some(line.as_str()) {
            return false;
        }
        println!("{line}");
        self.last_line = Some(line);
        true
    }
}

async fn load_story(input: &StoryInput) -> anyhow::Result<String> {
    input.load().await.with_context(|| match input {
        StoryInput::File(path) => format!("Failed to read story from {}", path.display()),
        StoryInput::Text(_) => "Failed to read story".to_string(),
    })
}

pub fn output_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let id = JobId::from("a");
        assert_eq!(
            Outcome::VideoSaved {
                job_id: id.clone(),
                path: PathBuf::from("x.mp4")
            }
            .exit_code(),
            0
        );
        assert_eq!(
            Outcome::Failed {
                job_id: id,
                message: "boom".to_string()
            }
            .exit_code(),
            2
        );
        assert_eq!(Outcome::Interrupted.exit_code(), 130);
    }

    #[test]
    fn output_files_land_in_the_output_dir() {
        assert_eq!(
            output_path(Path::new("out"), "cartoon_abc.mp4"),
            PathBuf::from("out/cartoon_abc.mp4")
        );
    }
}
