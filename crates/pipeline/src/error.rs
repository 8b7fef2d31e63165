use cartoon_client::{StatusFetchError, SubmissionError};
use cartoon_core::{CoreError, JobId};

/// Errors returned by [`Workflow`](crate::workflow::Workflow) actions.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The prompt or story failed validation before submission.
    #[error("Invalid input: {0}")]
    Invalid(#[from] CoreError),

    /// The job service rejected the submission; no poller was started.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// An existing character job could not be looked up.
    #[error(transparent)]
    Status(#[from] StatusFetchError),

    /// The character job has not published its image yet.
    #[error("Character job {0} has no image yet")]
    CharacterNotReady(JobId),

    /// The action is not allowed in the current step.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}
