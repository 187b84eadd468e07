//! Low-level callbacks emitted by running units.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use bytes::Bytes;
use pulley_events::TaskId;

/// File backing a unit's request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySource {
    /// Location of the body.
    pub path: PathBuf,
    /// Whether the file is a staged artifact to delete once the unit finishes.
    pub delete_after_use: bool,
}

impl BodySource {
    /// Staged artifact owned by the transport once launched.
    #[must_use]
    pub const fn staged(path: PathBuf) -> Self {
        Self {
            path,
            delete_after_use: true,
        }
    }

    /// Caller-owned file that must never be deleted.
    #[must_use]
    pub const fn caller_file(path: PathBuf) -> Self {
        Self {
            path,
            delete_after_use: false,
        }
    }
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The server answered; any status code.
    Response {
        /// HTTP status code.
        status: u16,
        /// Response headers keyed by lower-cased name.
        headers: BTreeMap<String, String>,
    },
    /// The request could not complete (connect failure, timeout, body read error).
    Error {
        /// Top-level error description.
        message: String,
        /// Descriptions of the underlying causes, outermost first, followed by the
        /// stack frames captured where the failure was observed.
        details: Vec<String>,
    },
    /// The unit was canceled.
    Canceled,
}

impl TransportOutcome {
    /// Capture an error, its source chain and the current call stack.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut details = Vec::new();
        let mut cause = err.source();
        while let Some(inner) = cause {
            details.push(inner.to_string());
            cause = inner.source();
        }
        details.extend(stack_frames());
        Self::Error {
            message: err.to_string(),
            details,
        }
    }
}

fn stack_frames() -> Vec<String> {
    let trace = Backtrace::force_capture();
    if trace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    trace
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Callback emitted by a running unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Body bytes were handed to the connection.
    BytesSent {
        /// Unit identifier.
        task_id: TaskId,
        /// Bytes sent so far.
        sent: u64,
        /// Total body size.
        expected: u64,
    },
    /// A response body chunk arrived.
    DataReceived {
        /// Unit identifier.
        task_id: TaskId,
        /// Chunk payload.
        chunk: Bytes,
    },
    /// The unit finished; always the last event for a unit.
    Finished {
        /// Unit identifier.
        task_id: TaskId,
        /// How the unit ended.
        outcome: TransportOutcome,
        /// Body file and its deletion policy.
        body: BodySource,
    },
}

impl TransportEvent {
    /// Unit the event belongs to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::BytesSent { task_id, .. }
            | Self::DataReceived { task_id, .. }
            | Self::Finished { task_id, .. } => task_id,
        }
    }
}

/// Receiver of transport callbacks, invoked from the callback workers.
pub trait TransportDelegate: Send + Sync {
    /// Handle one callback. Events for the same unit arrive in emission order.
    fn handle(&self, event: TransportEvent);
}
