//! Error types for the Kling video client.
//!
//! Each stage of a job has its own error type so callers can tell a bad
//! request apart from a remote rejection, a probe that may be retried, a
//! probe that must not be, and a failed download.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::task::StatusSnapshot;

/// Bad input, detected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt is {len} characters, which exceeds the {max} character limit")]
    PromptTooLong { len: usize, max: usize },

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("video id must not be empty")]
    EmptyVideoId,

    #[error("invalid {field} '{value}' (expected one of: {allowed})")]
    NotAllowed {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("indices must be comma-separated non-negative integers, got '{0}'")]
    BadIndices(String),

    #[error("no valid prompts selected")]
    NoPromptsSelected,
}

/// Failure to produce an API bearer token.
#[derive(Debug, Error)]
#[error("failed to sign API token: {0}")]
pub struct AuthError(#[from] pub jsonwebtoken::errors::Error);

/// The remote service did not accept a creation or extension request.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("remote rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("accepted response carried no task id")]
    MissingTaskId,

    #[error("malformed response: {0}")]
    Decode(String),
}

/// A single status probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Network or remote-side hiccup; the next probe may succeed.
    #[error("transient probe failure: {0}")]
    Transient(String),

    /// The remote will never answer this probe (unknown task, bad credentials).
    #[error("fatal probe failure: {0}")]
    Fatal(String),
}

impl ProbeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Transient(_))
    }
}

/// The poll loop stopped without reaching a terminal job state.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("task {task_id} cannot be polled: {source}")]
    Fatal {
        task_id: String,
        #[source]
        source: ProbeError,
        elapsed: Duration,
        last_snapshot: Option<StatusSnapshot>,
    },

    #[error("task {task_id}: gave up after {attempts} consecutive probe failures (last: {last_error})")]
    TransientRetriesExhausted {
        task_id: String,
        attempts: u32,
        last_error: String,
        elapsed: Duration,
        last_snapshot: Option<StatusSnapshot>,
    },
}

/// Downloading one artifact failed. No partial file is left behind.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("transfer of {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("retrieval of {url} cancelled")]
    Cancelled { url: String },

    #[error("artifact {id} has no download URL")]
    MissingUrl { id: String },

    #[error("retrieval task aborted: {0}")]
    Aborted(String),
}

/// Missing or unusable configuration, reported before any submission.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {name}: set {env} or pass it explicitly")]
    MissingCredential {
        name: &'static str,
        env: &'static str,
    },

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
