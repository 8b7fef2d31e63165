//! Error taxonomy of the job service client.
//!
//! Transport-level failures are wrapped by the operation that hit them so
//! callers can tell a failed submission (surfaced to the user) from a
//! failed status fetch (a missed poll tick).

use cartoon_core::{JobId, JobKind};

/// Failure talking to the job service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The job service returned a non-2xx status code.
    #[error("Job service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// A submit call was rejected or never reached the service.
#[derive(Debug, thiserror::Error)]
#[error("Failed to submit {kind} job: {source}")]
pub struct SubmissionError {
    pub kind: JobKind,
    #[source]
    pub source: TransportError,
}

/// A status fetch failed. Pollers treat this as a missed tick.
#[derive(Debug, thiserror::Error)]
#[error("Failed to fetch status for job {job_id}: {source}")]
pub struct StatusFetchError {
    pub job_id: JobId,
    #[source]
    pub source: TransportError,
}
