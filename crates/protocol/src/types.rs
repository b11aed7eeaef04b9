use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload task.
///
/// The only legal transitions are `Created → Uploading`,
/// `Uploading → Finished`, `Uploading → Error` and `Error → Uploading`
/// (retry). [`TaskStatus::permits`] encodes the full relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "error")]
    Error,
}

impl TaskStatus {
    /// Returns `true` if an upload attempt may be started from this state.
    pub fn is_startable(self) -> bool {
        matches!(self, TaskStatus::Created | TaskStatus::Error)
    }

    /// Returns `true` if `next` is a legal successor of this state.
    pub fn permits(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Created, TaskStatus::Uploading)
                | (TaskStatus::Uploading, TaskStatus::Finished)
                | (TaskStatus::Uploading, TaskStatus::Error)
                | (TaskStatus::Error, TaskStatus::Uploading)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Finished => "finished",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-unique identifier of a registered upload task.
///
/// Allocated once at registration and never reused or mutated. The
/// registry treats the contents as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of one upload task.
///
/// A `Task` value is never mutated in place; the `with_*` constructors
/// return a fresh value and leave their input untouched, so holders of an
/// old snapshot keep a consistent view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub status: TaskStatus,
    /// Opaque locator of the local resource to upload.
    pub source: String,
    /// Content type classified at registration; immutable afterwards.
    pub content_type: String,
    pub bytes_transferred: u64,
    /// Unknown until the transport reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Failure message recorded on the `Error` transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a freshly registered task: `Created`, no bytes moved yet.
    pub fn new(source: impl Into<String>, content_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: TaskStatus::Created,
            source: source.into(),
            content_type: content_type.into(),
            bytes_transferred: 0,
            total_bytes: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy with the given status.
    ///
    /// The recorded failure message describes the `Error` status, so it is
    /// cleared whenever the new status is anything else.
    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            error: if status == TaskStatus::Error {
                self.error.clone()
            } else {
                None
            },
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns a copy with updated progress counters.
    pub fn with_progress(&self, bytes_transferred: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns a copy marked `Error` with the failure message recorded.
    pub fn with_failure(&self, message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            error: Some(message.into()),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => self.bytes_transferred as f64 / total as f64 * 100.0,
            _ => 0.0,
        }
    }
}

/// Transport-reported state of an in-flight transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
}

impl TransportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Success | TransportState::Failed)
    }
}

/// One progress event emitted by a transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferUpdate {
    pub state: TransportState,
    pub bytes_transferred: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}
