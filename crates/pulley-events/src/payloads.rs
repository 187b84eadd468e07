//! Typed payloads describing an upload task's lifecycle.
//!
//! # Design
//! - Progress events are transient and never persisted.
//! - Result events (`enqueued`, `completed`, `failed`, `canceled`) are the durable subset.
//! - Every event carries the caller's optional tag so consumers can correlate tasks.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EventsError, EventsResult};

/// Progress value reported for a task that was canceled.
pub const CANCELED_PROGRESS: i32 = -1;

/// Identifier assigned to a single upload task.
///
/// Identifiers are formed as `<context-identifier>.<token>` where the token is a
/// freshly generated random value, so they never repeat within a process run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new identifier scoped to the supplied transport context.
    #[must_use]
    pub fn generate(context: &str) -> Self {
        Self(format!("{context}.{}", Uuid::new_v4().simple()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Context identifier prefix, when the id carries one.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(context, _)| context)
    }
}

impl Display for TaskId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle states an upload task moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Handed to the transport, no bytes reported yet.
    Enqueued,
    /// Bytes are flowing.
    Running,
    /// Finished with a 2xx response.
    Completed,
    /// Finished with a non-2xx response or a transport error.
    Failed,
    /// Canceled by the caller.
    Canceled,
    /// Reserved; no transition leads here.
    Paused,
}

impl UploadStatus {
    /// Stable numeric code used by consumers that predate the string form.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Enqueued => 1,
            Self::Running => 2,
            Self::Completed => 3,
            Self::Failed => 4,
            Self::Canceled => 5,
            Self::Paused => 6,
        }
    }

    /// Whether the status ends the task's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Paused => "paused",
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Percentage update for a running task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task the update belongs to.
    pub task_id: TaskId,
    /// Status at the time of the update.
    pub status: UploadStatus,
    /// Percentage in `0..=100`, or [`CANCELED_PROGRESS`].
    pub progress: i32,
    /// Caller-supplied correlation tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ProgressEvent {
    /// Progress update emitted when a task is canceled.
    #[must_use]
    pub const fn canceled(task_id: TaskId, tag: Option<String>) -> Self {
        Self {
            task_id,
            status: UploadStatus::Canceled,
            progress: CANCELED_PROGRESS,
            tag,
        }
    }
}

/// Durable lifecycle outcome for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultEvent {
    /// The task was handed to the transport.
    Enqueued {
        /// Task identifier.
        task_id: TaskId,
        /// Caller-supplied correlation tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// The server answered with a 2xx status.
    Completed {
        /// Task identifier.
        task_id: TaskId,
        /// Response body decoded as UTF-8.
        #[serde(default)]
        message: Option<String>,
        /// HTTP status code.
        status_code: u16,
        /// Response headers keyed by lower-cased name.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Caller-supplied correlation tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// The server rejected the upload or the transport failed.
    Failed {
        /// Task identifier.
        task_id: TaskId,
        /// HTTP status code, `500` for transport errors.
        status_code: u16,
        /// Machine-readable error code.
        code: String,
        /// Response body or error description.
        #[serde(default)]
        message: Option<String>,
        /// Error source chain followed by captured trace frames.
        #[serde(default)]
        details: Vec<String>,
        /// Caller-supplied correlation tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// The caller canceled the upload before it finished.
    Canceled {
        /// Task identifier.
        task_id: TaskId,
        /// Caller-supplied correlation tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
}

impl ResultEvent {
    /// Task the event belongs to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Enqueued { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Canceled { task_id, .. } => task_id,
        }
    }

    /// Lifecycle status the event represents.
    #[must_use]
    pub const fn status(&self) -> UploadStatus {
        match self {
            Self::Enqueued { .. } => UploadStatus::Enqueued,
            Self::Completed { .. } => UploadStatus::Completed,
            Self::Failed { .. } => UploadStatus::Failed,
            Self::Canceled { .. } => UploadStatus::Canceled,
        }
    }

    /// Correlation tag, if the caller supplied one.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Enqueued { tag, .. }
            | Self::Completed { tag, .. }
            | Self::Failed { tag, .. }
            | Self::Canceled { tag, .. } => tag.as_deref(),
        }
    }

    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.status().as_str()
    }
}

/// Either kind of event, tagged for line-oriented output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// A progress update.
    Progress(ProgressEvent),
    /// A result update.
    Result(ResultEvent),
}

impl UploadEvent {
    /// Task the event belongs to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Progress(event) => &event.task_id,
            Self::Result(event) => event.task_id(),
        }
    }

    /// Serialise the event as a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error when the event cannot be encoded.
    pub fn to_json_line(&self) -> EventsResult<String> {
        serde_json::to_string(self).map_err(|source| EventsError::Encode {
            task_id: self.task_id().clone(),
            source,
        })
    }
}
