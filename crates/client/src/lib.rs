//! Client for the story-to-cartoon job service.
//!
//! Provides the [`JobService`] seam, its reqwest-backed implementation
//! [`JobServiceApi`], connection configuration and the submission /
//! status-fetch error types.

pub mod api;
pub mod config;
pub mod error;
pub mod service;

pub use api::JobServiceApi;
pub use config::ClientConfig;
pub use error::{StatusFetchError, SubmissionError, TransportError};
pub use service::JobService;
