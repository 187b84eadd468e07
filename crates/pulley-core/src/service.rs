//! Workflow and inspection interfaces exposed to callers.

use async_trait::async_trait;
use pulley_events::{ResultEvent, TaskId};

use crate::error::UploadResult;
use crate::model::{EnqueueBinaryRequest, EnqueueBlockRequest, EnqueueRequest};
use crate::registry::UploadTask;

/// Operations that start or stop uploads.
#[async_trait]
pub trait UploadWorkflow: Send + Sync {
    /// Stage a multipart body and hand it to the transport.
    async fn enqueue(&self, request: EnqueueRequest) -> UploadResult<TaskId>;

    /// Hand a file to the transport as the raw request body.
    async fn enqueue_binary(&self, request: EnqueueBinaryRequest) -> UploadResult<TaskId>;

    /// Upload a file as a sequence of range requests.
    async fn enqueue_blocks(&self, request: EnqueueBlockRequest) -> UploadResult<TaskId>;

    /// Cancel a running task. Unknown or finished ids are ignored.
    async fn cancel(&self, task_id: &TaskId) -> bool;

    /// Cancel every running task, returning the ids that were canceled.
    async fn cancel_all(&self) -> Vec<TaskId>;

    /// Remove every persisted result.
    async fn clear_results(&self) -> anyhow::Result<()>;
}

/// Read-only view of task state.
#[async_trait]
pub trait UploadInspector: Send + Sync {
    /// Snapshot of every active task.
    async fn list(&self) -> Vec<UploadTask>;

    /// Snapshot of a single active task.
    async fn get(&self, task_id: &TaskId) -> Option<UploadTask>;

    /// Persisted results in insertion order.
    async fn results(&self) -> anyhow::Result<Vec<ResultEvent>> {
        Ok(Vec::new())
    }
}
