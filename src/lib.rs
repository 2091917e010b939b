pub mod api;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod generator;
pub mod naming;
pub mod params;
pub mod poller;
pub mod prompts;
pub mod task;

pub use api::kling::KlingClient;
pub use api::{StatusProber, VideoService};
pub use config::Config;
pub use download::{ArtifactRetriever, CollisionPolicy};
pub use generator::{JobReport, JobRequest, JobResult, JobSpec, Pipeline, RunOptions};
pub use poller::{PollSettings, wait_for_completion};
pub use task::{ArtifactRef, Job, OperationKind, PollOutcome, StatusSnapshot, TaskState};

pub(crate) fn logi(message: impl AsRef<str>) {
    tracing::info!("{}", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    tracing::info!("[OK] {}", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    tracing::warn!("{}", message.as_ref());
}
