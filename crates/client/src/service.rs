//! The seam between the workflow and the remote job service.

use async_trait::async_trait;
use cartoon_core::{CharacterRequest, JobId, JobSnapshot, StoryRequest, SubmitResponse};

use crate::error::{StatusFetchError, SubmissionError};

/// Stateless operations offered by the job service.
///
/// [`JobServiceApi`](crate::api::JobServiceApi) is the HTTP
/// implementation; pollers and workflows only depend on this trait.
/// No retry or backoff happens at this layer.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Queue a character image job.
    async fn submit_character(
        &self,
        request: &CharacterRequest,
    ) -> Result<SubmitResponse, SubmissionError>;

    /// Queue a story (video) job, optionally linked to a character job.
    async fn submit_story(&self, request: &StoryRequest)
        -> Result<SubmitResponse, SubmissionError>;

    /// Fetch the latest status snapshot for a job.
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobSnapshot, StatusFetchError>;

    /// Reference to the finished video. Pure; performs no request.
    fn download_url(&self, job_id: &JobId) -> String;
}
