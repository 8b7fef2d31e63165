//! Events published by a [`JobPoller`](crate::poller::JobPoller).
//!
//! Every event carries the job id and the poll session that produced it,
//! so consumers can drop anything from a loop that has since been torn
//! down or replaced.

use cartoon_core::{JobId, JobKind, JobSnapshot, JobStatus, Timestamp};

/// Why a polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The service reported `completed` or `failed`.
    Terminal(JobStatus),
    /// A character job published its image.
    CharacterReady,
    /// Torn down by the owner.
    Cancelled,
}

/// A poller event.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A status fetch succeeded.
    Snapshot {
        session: u64,
        job_id: JobId,
        kind: JobKind,
        tick: u64,
        snapshot: JobSnapshot,
        received_at: Timestamp,
    },

    /// A status fetch failed or timed out; the next tick still fires.
    FetchFailed {
        session: u64,
        job_id: JobId,
        kind: JobKind,
        tick: u64,
        error: String,
    },

    /// The loop has exited and will not publish again.
    Stopped {
        session: u64,
        job_id: JobId,
        kind: JobKind,
        reason: StopReason,
    },
}

impl PollEvent {
    pub fn session(&self) -> u64 {
        match self {
            Self::Snapshot { session, .. }
            | Self::FetchFailed { session, .. }
            | Self::Stopped { session, .. } => *session,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Snapshot { job_id, .. }
            | Self::FetchFailed { job_id, .. }
            | Self::Stopped { job_id, .. } => job_id,
        }
    }
}
