//! Event error primitives.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::payloads::TaskId;

/// Errors raised while handling upload events.
#[derive(Debug)]
pub enum EventsError {
    /// Serialising an event failed.
    Encode {
        /// Task the event belonged to.
        task_id: TaskId,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

impl EventsError {
    /// Task associated with the failure.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Encode { task_id, .. } => task_id,
        }
    }
}

impl Display for EventsError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { .. } => formatter.write_str("failed to encode upload event"),
        }
    }
}

impl Error for EventsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode { source, .. } => Some(source),
        }
    }
}

/// Result wrapper for event operations.
pub type EventsResult<T> = Result<T, EventsError>;
