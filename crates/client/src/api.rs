//! REST client for the story-to-cartoon job service.
//!
//! Wraps the service's HTTP API (character and story submission, status
//! lookup, video download, health probe) using [`reqwest`].

use async_trait::async_trait;
use cartoon_core::{CharacterRequest, JobId, JobKind, JobSnapshot, StoryRequest, SubmitResponse};
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::{StatusFetchError, SubmissionError, TransportError};
use crate::service::JobService;

/// HTTP client for one job service deployment.
#[derive(Clone)]
pub struct JobServiceApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response of the service root endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

impl JobServiceApi {
    /// Create a client from configuration, applying its request timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a character job.
    ///
    /// Sends `POST /generate_character` with `{prompt}`.
    pub async fn submit_character_job(
        &self,
        request: &CharacterRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        self.post_json("/generate_character", request)
            .await
            .map_err(|source| SubmissionError {
                kind: JobKind::Character,
                source,
            })
    }

    /// Submit a story job.
    ///
    /// Sends `POST /generate`.  When `character_job_id` is set the service
    /// reuses that job's character image; otherwise the field is absent.
    pub async fn submit_story_job(
        &self,
        request: &StoryRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        self.post_json("/generate", request)
            .await
            .map_err(|source| SubmissionError {
                kind: JobKind::Story,
                source,
            })
    }

    /// Fetch a status snapshot via `GET /status/{job_id}`.
    pub async fn get_status(&self, job_id: &JobId) -> Result<JobSnapshot, StatusFetchError> {
        self.fetch_snapshot(job_id)
            .await
            .map_err(|source| StatusFetchError {
                job_id: job_id.clone(),
                source,
            })
    }

    /// URL of the finished video for `job_id`.
    pub fn video_url(&self, job_id: &JobId) -> String {
        self.job_url("download", job_id)
    }

    /// Download the finished video into memory.
    ///
    /// The service answers 404 until the final assembly is written.
    pub async fn download_video(&self, job_id: &JobId) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(self.video_url(job_id)).send().await?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;

        tracing::info!(job_id = %job_id, bytes = bytes.len(), "Video downloaded");
        Ok(bytes.to_vec())
    }

    /// Probe the service root endpoint.
    pub async fn health_check(&self) -> Result<HealthResponse, TransportError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// `{base_url}/{route}/{job_id}` with the id percent-encoded as a
    /// single path segment.
    fn job_url(&self, route: &str, job_id: &JobId) -> String {
        let Ok(mut url) = reqwest::Url::parse(&self.base_url) else {
            return format!("{}/{}/{}", self.base_url, route, job_id);
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(route).push(job_id.as_str());
        }
        url.into()
    }

    async fn fetch_snapshot(&self, job_id: &JobId) -> Result<JobSnapshot, TransportError> {
        let response = self
            .client
            .get(self.job_url("status", job_id))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<SubmitResponse, TransportError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::info!(job_id = %submitted.job_id, path, "Job submitted");
        Ok(submitted)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobService for JobServiceApi {
    async fn submit_character(
        &self,
        request: &CharacterRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        self.submit_character_job(request).await
    }

    async fn submit_story(
        &self,
        request: &StoryRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        self.submit_story_job(request).await
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<JobSnapshot, StatusFetchError> {
        self.get_status(job_id).await
    }

    fn download_url(&self, job_id: &JobId) -> String {
        self.video_url(job_id)
    }
}
