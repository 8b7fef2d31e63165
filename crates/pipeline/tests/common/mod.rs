//! Shared test helpers: a scripted in-memory job service.
//!
//! Each job gets a queue of [`Step`]s consumed one per status fetch.  Once
//! the queue is empty the last snapshot is repeated, so a job without a
//! terminal step keeps "running" forever.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use cartoon_client::{JobService, StatusFetchError, SubmissionError, TransportError};
use cartoon_core::{
    CharacterRequest, JobId, JobKind, JobSnapshot, JobStatus, StoryRequest, SubmitResponse,
};

/// One scripted answer to a status fetch.
pub struct Step {
    delay: Duration,
    outcome: Outcome,
}

enum Outcome {
    Snapshot(JobSnapshot),
    Fail,
}

impl Step {
    pub fn ok(snapshot: JobSnapshot) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Snapshot(snapshot),
        }
    }

    pub fn fail() -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Outcome::Fail,
        }
    }

    /// Answer only after `delay` has elapsed.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub fn running(job_id: &str, progress: u8) -> JobSnapshot {
    JobSnapshot::new(job_id, JobStatus::Running, progress)
}

pub fn completed(job_id: &str) -> JobSnapshot {
    JobSnapshot::new(job_id, JobStatus::Completed, 100)
}

pub fn failed(job_id: &str, progress: u8, message: &str) -> JobSnapshot {
    JobSnapshot::new(job_id, JobStatus::Failed, progress).with_message(message)
}

pub const FOX_IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

#[derive(Default)]
struct Inner {
    next_ids: VecDeque<JobId>,
    issued: u32,
    scripts: HashMap<JobId, VecDeque<Step>>,
    last: HashMap<JobId, JobSnapshot>,
    fetches: Vec<(JobId, Instant)>,
    character_requests: Vec<CharacterRequest>,
    story_requests: Vec<StoryRequest>,
    reject_submissions: bool,
}

#[derive(Default)]
pub struct ScriptedService {
    inner: Mutex<Inner>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Job ids handed out by the next submissions, in order.
    pub fn issue_ids(&self, ids: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ids.extend(ids.iter().map(|id| JobId::from(*id)));
    }

    pub fn script(&self, job_id: &str, steps: Vec<Step>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .scripts
            .entry(JobId::from(job_id))
            .or_default()
            .extend(steps);
    }

    pub fn reject_submissions(&self, reject: bool) {
        self.inner.lock().unwrap().reject_submissions = reject;
    }

    /// When each status fetch for `job_id` started.
    pub fn fetch_times(&self, job_id: &str) -> Vec<Instant> {
        let inner = self.inner.lock().unwrap();
        inner
            .fetches
            .iter()
            .filter(|(id, _)| id.as_str() == job_id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn fetch_count(&self, job_id: &str) -> usize {
        self.fetch_times(job_id).len()
    }

    pub fn character_requests(&self) -> Vec<CharacterRequest> {
        self.inner.lock().unwrap().character_requests.clone()
    }

    pub fn story_requests(&self) -> Vec<StoryRequest> {
        self.inner.lock().unwrap().story_requests.clone()
    }

    fn issue(&self, kind: JobKind) -> Result<SubmitResponse, SubmissionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.reject_submissions {
            return Err(SubmissionError {
                kind,
                source: TransportError::Api {
                    status: 422,
                    body: "rejected".to_string(),
                },
            });
        }
        inner.issued += 1;
        let issued = inner.issued;
        let job_id = inner
            .next_ids
            .pop_front()
            .unwrap_or_else(|| JobId::new(format!("{kind}-{issued}")));
        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
        })
    }
}

#[async_trait]
impl JobService for ScriptedService {
    async fn submit_character(
        &self,
        request: &CharacterRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        let response = self.issue(JobKind::Character)?;
        self.inner
            .lock()
            .unwrap()
            .character_requests
            .push(request.clone());
        Ok(response)
    }

    async fn submit_story(
        &self,
        request: &StoryRequest,
    ) -> Result<SubmitResponse, SubmissionError> {
        let response = self.issue(JobKind::Story)?;
        self.inner.lock().unwrap().story_requests.push(request.clone());
        Ok(response)
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<JobSnapshot, StatusFetchError> {
        let (delay, outcome) = {
            let mut inner = self.inner.lock().unwrap();
            inner.fetches.push((job_id.clone(), Instant::now()));
            let step = inner.scripts.get_mut(job_id).and_then(|s| s.pop_front());
            match step {
                Some(step) => {
                    if let Outcome::Snapshot(snapshot) = &step.outcome {
                        inner.last.insert(job_id.clone(), snapshot.clone());
                    }
                    (step.delay, step.outcome)
                }
                None => match inner.last.get(job_id) {
                    Some(snapshot) => (Duration::ZERO, Outcome::Snapshot(snapshot.clone())),
                    None => (Duration::ZERO, Outcome::Fail),
                },
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Outcome::Snapshot(snapshot) => Ok(snapshot),
            Outcome::Fail => Err(StatusFetchError {
                job_id: job_id.clone(),
                source: TransportError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                },
            }),
        }
    }

    fn download_url(&self, job_id: &JobId) -> String {
        format!("fake://download/{job_id}")
    }
}
