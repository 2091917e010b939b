//! JSON envelopes returned by the Kling API, decoded eagerly into typed
//! jobs and snapshots so nothing loosely typed reaches the poll loop.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ProbeError, SubmissionError};
use crate::task::{ArtifactRef, Job, OperationKind, StatusSnapshot, TaskState};

/// Remote codes that signal throttling or a server-side fault.
const TRANSIENT_CODES: &[i64] = &[1302, 1303, 5000, 5001, 5002];

const BODY_SNIPPET_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<TaskData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskData {
    pub task_id: Option<String>,
    pub task_status: Option<String>,
    pub task_status_msg: Option<String>,
    pub created_at: Option<i64>,
    pub task_result: Option<TaskResult>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TaskResult {
    #[serde(default)]
    pub videos: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoEntry {
    pub id: Option<String>,
    pub url: Option<String>,
    pub duration: Option<serde_json::Value>,
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

pub(crate) fn is_transient_code(code: i64) -> bool {
    TRANSIENT_CODES.contains(&code)
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Parses the body of a submission response.
pub(crate) fn decode_job(
    status: StatusCode,
    body: &str,
    kind: OperationKind,
) -> Result<Job, SubmissionError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(err) if status.is_success() => return Err(SubmissionError::Decode(err.to_string())),
        Err(_) => {
            return Err(SubmissionError::Http {
                status: status.as_u16(),
                body: snippet(body),
            });
        }
    };

    if envelope.code != 0 {
        return Err(SubmissionError::Rejected {
            code: envelope.code,
            message: if envelope.message.is_empty() {
                "Unknown error".to_string()
            } else {
                envelope.message
            },
        });
    }
    if !status.is_success() {
        return Err(SubmissionError::Http {
            status: status.as_u16(),
            body: snippet(body),
        });
    }

    let data = envelope.data.unwrap_or_default();
    let id = data
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(SubmissionError::MissingTaskId)?;
    let created_at = data
        .created_at
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(Job {
        id,
        kind,
        created_at,
    })
}

/// Parses the body of a status response and classifies failures.
pub(crate) fn decode_snapshot(
    status: StatusCode,
    body: &str,
    job: &Job,
) -> Result<StatusSnapshot, ProbeError> {
    let envelope = serde_json::from_str::<Envelope>(body);
    let remote_error = envelope
        .as_ref()
        .ok()
        .filter(|envelope| envelope.code != 0)
        .map(|envelope| (envelope.code, envelope.message.as_str()));

    if remote_error.is_some() || !status.is_success() {
        // Either signal alone makes the failure transient.
        let transient = is_transient_status(status)
            || remote_error.is_some_and(|(code, _)| is_transient_code(code));
        let reason = match remote_error {
            Some((code, message)) => {
                format!("HTTP {}, remote code {}: {}", status.as_u16(), code, message)
            }
            None => format!("HTTP {}: {}", status.as_u16(), snippet(body)),
        };
        return Err(if transient {
            ProbeError::Transient(reason)
        } else {
            ProbeError::Fatal(reason)
        });
    }

    let envelope = envelope
        .map_err(|err| ProbeError::Transient(format!("undecodable status response: {err}")))?;
    let data = envelope
        .data
        .ok_or_else(|| ProbeError::Transient("status response without data".into()))?;

    let raw_status = data.task_status.unwrap_or_default();
    let state = TaskState::from_remote(&raw_status)
        .ok_or_else(|| ProbeError::Transient(format!("unrecognized task status '{raw_status}'")))?;

    let mut artifacts = Vec::new();
    if let Some(result) = data.task_result {
        for (idx, video) in result.videos.into_iter().enumerate() {
            let Some(url) = video.url.filter(|u| !u.trim().is_empty()) else {
                warn!(task_id = %job.id, index = idx, "result entry without URL ignored");
                continue;
            };
            artifacts.push(ArtifactRef {
                id: video.id.unwrap_or_default(),
                url,
                duration: video.duration.and_then(|d| match d {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
            });
        }
    }

    Ok(StatusSnapshot {
        task_id: data.task_id.unwrap_or_else(|| job.id.clone()),
        state,
        artifacts,
        message: data.task_status_msg.filter(|m| !m.trim().is_empty()),
    })
}
