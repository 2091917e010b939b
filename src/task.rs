use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Creation,
    Extension,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Creation => "creation",
            OperationKind::Extension => "extension",
        }
    }

    /// API path (relative to the base URL) for submitting and probing tasks of this kind.
    pub fn endpoint(self) -> &'static str {
        match self {
            OperationKind::Creation => "videos/text2video",
            OperationKind::Extension => "videos/video-extend",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task accepted by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: OperationKind,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Submitted,
    Processing,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Maps the service's `task_status` string. Unknown strings yield `None`.
    pub fn from_remote(status: &str) -> Option<Self> {
        match status {
            "submitted" => Some(TaskState::Submitted),
            "processing" => Some(TaskState::Processing),
            "succeed" | "succeeded" => Some(TaskState::Succeeded),
            "failed" => Some(TaskState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Position in the lifecycle; states only ever move forward.
    pub fn rank(self) -> u8 {
        match self {
            TaskState::Submitted => 0,
            TaskState::Processing => 1,
            TaskState::Succeeded | TaskState::Failed => 2,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Processing => "processing",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A produced video, as listed in a succeeded task's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub url: String,
    /// Duration in seconds, verbatim from the service.
    pub duration: Option<String>,
}

/// One observation of a task. Each probe produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    pub message: Option<String>,
}

impl StatusSnapshot {
    pub fn new(task_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            artifacts: Vec::new(),
            message: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// How a poll loop ended when it did not hit a probe error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded {
        snapshot: StatusSnapshot,
        elapsed: Duration,
    },
    Failed {
        reason: String,
        snapshot: StatusSnapshot,
        elapsed: Duration,
    },
    TimedOut {
        elapsed: Duration,
        last_snapshot: Option<StatusSnapshot>,
    },
    Cancelled {
        elapsed: Duration,
        last_snapshot: Option<StatusSnapshot>,
    },
}

impl PollOutcome {
    /// Artifacts of a succeeded task; empty for every other outcome.
    pub fn artifacts(&self) -> &[ArtifactRef] {
        match self {
            PollOutcome::Succeeded { snapshot, .. } => &snapshot.artifacts,
            _ => &[],
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Succeeded { elapsed, .. }
            | PollOutcome::Failed { elapsed, .. }
            | PollOutcome::TimedOut { elapsed, .. }
            | PollOutcome::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::Succeeded { snapshot, elapsed } => write!(
                f,
                "succeeded with {} video(s) after {}s",
                snapshot.artifacts.len(),
                elapsed.as_secs()
            ),
            PollOutcome::Failed { reason, elapsed, .. } => {
                write!(f, "failed after {}s: {}", elapsed.as_secs(), reason)
            }
            PollOutcome::TimedOut { elapsed, .. } => {
                write!(f, "timed out after {}s", elapsed.as_secs())
            }
            PollOutcome::Cancelled { elapsed, .. } => {
                write!(f, "cancelled after {}s", elapsed.as_secs())
            }
        }
    }
}
