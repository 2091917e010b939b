//! Remote service boundary.
//!
//! The poll loop only needs [`StatusProber`]; the job pipeline needs the
//! full [`VideoService`]. [`kling::KlingClient`] implements both over HTTP.

use async_trait::async_trait;

use crate::error::{ProbeError, SubmissionError};
use crate::params::{ExtensionParams, GenerationParams};
use crate::task::{Job, StatusSnapshot};

pub mod auth;
pub mod kling;
mod wire;

#[async_trait]
pub trait StatusProber: Send + Sync {
    /// Fetches the current status of `job`, using the endpoint for its operation kind.
    async fn probe(&self, job: &Job) -> Result<StatusSnapshot, ProbeError>;
}

#[async_trait]
pub trait VideoService: StatusProber {
    /// Submits a text-to-video task. Sends exactly one request and never retries.
    async fn submit_creation(&self, params: &GenerationParams) -> Result<Job, SubmissionError>;

    /// Submits an extension of an existing video. Sends exactly one request and never retries.
    async fn submit_extension(&self, params: &ExtensionParams) -> Result<Job, SubmissionError>;
}
