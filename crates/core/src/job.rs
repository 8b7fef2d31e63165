//! Job model shared by the service client, the poller and the workflow.
//!
//! Mirrors the job service's JSON contract: submission requests and
//! responses, and the status snapshot returned for a job id.  Status
//! snapshots are decoded leniently because the service writes them
//! incrementally as the pipeline advances.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

use crate::error::CoreError;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Artifact names
// ---------------------------------------------------------------------------

/// Script text produced by the head writer.
pub const ARTIFACT_SCRIPT: &str = "script";
/// Structured series bible.
pub const ARTIFACT_BIBLE: &str = "bible";
/// Character image, delivered as a `data:` URL.
pub const ARTIFACT_CHARACTER_IMAGE: &str = "character_image";

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The two kinds of remote job.
///
/// Character jobs produce an image artifact; story jobs produce a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Character,
    Story,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Story => "story",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Coarse job status.
///
/// The service writes intermediate tokens such as `planning`,
/// `generating` or `assembling` while work is underway; every token other
/// than the four canonical ones is read as [`JobStatus::Running`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Parse a status token, ignoring case and surrounding whitespace.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("queued") {
            Self::Queued
        } else if token.eq_ignore_ascii_case("completed") {
            Self::Completed
        } else if token.eq_ignore_ascii_case("failed") {
            Self::Failed
        } else {
            Self::Running
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` end polling.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(Self::parse(&token))
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Named outputs attached to a status snapshot.
///
/// Keys appear incrementally; a missing key means "not produced yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bible: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_image: Option<String>,
    /// Any artifact this client does not know by name.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl Artifacts {
    /// The character image reference, if one has been produced.
    pub fn character_image(&self) -> Option<&str> {
        self.character_image.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_none()
            && self.bible.is_none()
            && self.character_image.is_none()
            && self.other.is_empty()
    }

    /// Names of all artifacts present, in a stable order.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.script.is_some() {
            names.push(ARTIFACT_SCRIPT);
        }
        if self.bible.is_some() {
            names.push(ARTIFACT_BIBLE);
        }
        if self.character_image.is_some() {
            names.push(ARTIFACT_CHARACTER_IMAGE);
        }
        names.extend(self.other.keys().map(String::as_str));
        names
    }
}

// ---------------------------------------------------------------------------
// JobSnapshot
// ---------------------------------------------------------------------------

/// A status snapshot for one job, as returned by `GET /status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// The token exactly as the service wrote it (e.g. `"planning"`).
    pub status_label: String,
    /// Overall progress, clamped to 0..=100.
    pub progress_current: u8,
    pub progress_total: Option<u8>,
    /// Human-readable status line; empty when the service sent none.
    pub message: String,
    pub artifacts: Artifacts,
}

#[derive(Deserialize)]
struct RawSnapshot {
    job_id: JobId,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress_current: Option<i64>,
    #[serde(default)]
    progress_total: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    artifacts: Option<Artifacts>,
}

impl From<RawSnapshot> for JobSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let status_label = raw
            .status
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| JobStatus::Queued.as_str().to_string());

        Self {
            job_id: raw.job_id,
            status: JobStatus::parse(&status_label),
            status_label,
            progress_current: clamp_progress(raw.progress_current.unwrap_or(0)),
            progress_total: raw.progress_total.map(clamp_progress),
            message: raw.message.unwrap_or_default(),
            artifacts: raw.artifacts.unwrap_or_default(),
        }
    }
}

fn clamp_progress(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

impl JobSnapshot {
    /// Build a snapshot by hand (fake services, tests).
    pub fn new(job_id: impl Into<JobId>, status: JobStatus, progress_current: u8) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            status_label: status.as_str().to_string(),
            progress_current: progress_current.min(100),
            progress_total: None,
            message: String::new(),
            artifacts: Artifacts::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.status_label = label.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_character_image(mut self, image: impl Into<String>) -> Self {
        self.artifacts.character_image = Some(image.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this snapshot ends polling for a job of the given kind.
    ///
    /// Character jobs also finish as soon as the image artifact appears,
    /// since the service may publish the image before flipping status.
    pub fn ends_polling(&self, kind: JobKind) -> bool {
        self.is_terminal()
            || (kind == JobKind::Character && self.artifacts.character_image().is_some())
    }
}

// ---------------------------------------------------------------------------
// Requests / responses
// ---------------------------------------------------------------------------

/// Body of `POST /generate_character`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct CharacterRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
}

impl CharacterRequest {
    pub fn new(prompt: impl AsRef<str>) -> Self {
        Self {
            prompt: prompt.as_ref().trim().to_string(),
        }
    }
}

/// Narration settings for a story job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub language: String,
    pub gender: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            language: "en".to_string(),
            gender: "male".to_string(),
        }
    }
}

/// Default target video length.
pub const DEFAULT_DURATION_SECS: u32 = 300;
/// Default rendering style pack.
pub const DEFAULT_STYLE_PACK: &str = "basic_cartoon_v1";

/// Body of `POST /generate`.
///
/// `character_job_id` is left out of the JSON entirely when no character
/// job is linked.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct StoryRequest {
    #[validate(length(min = 1, message = "story must not be empty"))]
    pub story: String,
    pub duration_seconds: u32,
    pub style_pack: String,
    pub subtitles: bool,
    pub voice: VoiceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_job_id: Option<JobId>,
}

impl StoryRequest {
    pub fn new(story: impl AsRef<str>) -> Self {
        Self {
            story: story.as_ref().trim().to_string(),
            duration_seconds: DEFAULT_DURATION_SECS,
            style_pack: DEFAULT_STYLE_PACK.to_string(),
            subtitles: true,
            voice: VoiceConfig::default(),
            character_job_id: None,
        }
    }

    /// Link this story to a completed character job.
    pub fn with_character(mut self, job_id: JobId) -> Self {
        self.character_job_id = Some(job_id);
        self
    }
}

/// Response to either submission endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub status: JobStatus,
}

/// Run `validator` checks and fold the result into a [`CoreError`].
pub fn validate_request<T: Validate>(request: &T) -> Result<(), CoreError> {
    request
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))
}
