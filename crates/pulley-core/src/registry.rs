//! Task state machine and per-task bookkeeping.
//!
//! # Design
//! - One mutex guards both the running-task map and the response buffers.
//! - The lock is only held for map manipulation; callers perform I/O after it is released.
//! - Entries are removed exactly once, by whichever terminal transition happens first.
//! - Progress is throttled so a task's reported percentages strictly increase.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pulley_events::{CANCELED_PROGRESS, ProgressEvent, TaskId, UploadStatus};
use serde::Serialize;

/// Snapshot of an active task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    /// Task identifier.
    pub task_id: TaskId,
    /// Current lifecycle status.
    pub status: UploadStatus,
    /// Last reported percentage.
    pub progress: i32,
    /// Correlation tag.
    pub tag: Option<String>,
    /// Whether metered connections may carry the upload.
    pub allow_cellular: bool,
}

impl UploadTask {
    /// Fresh task in the `enqueued` state.
    #[must_use]
    pub const fn enqueued(task_id: TaskId, tag: Option<String>, allow_cellular: bool) -> Self {
        Self {
            task_id,
            status: UploadStatus::Enqueued,
            progress: 0,
            tag,
            allow_cellular,
        }
    }
}

/// Task removed from the registry at its terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTask {
    /// Task state with the terminal status applied.
    pub task: UploadTask,
    /// Accumulated response body.
    pub body: Vec<u8>,
}

/// Exclusive registry of active upload tasks.
pub struct TaskRegistry {
    step_update: i32,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    running: HashMap<TaskId, UploadTask>,
    buffers: HashMap<TaskId, Vec<u8>>,
}

impl TaskRegistry {
    /// Construct an empty registry with the given progress step threshold.
    #[must_use]
    pub fn new(step_update: i32) -> Self {
        Self {
            step_update: step_update.max(0),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Track a new task. Returns `false` when the id is already tracked.
    pub fn register(&self, task: UploadTask) -> bool {
        let mut state = self.lock();
        if state.running.contains_key(&task.task_id) {
            return false;
        }
        state.running.insert(task.task_id.clone(), task);
        true
    }

    /// Apply a bytes-sent callback and return the progress event to emit, if any.
    ///
    /// A 0% callback for an `enqueued` task always emits and moves it to `running`;
    /// every other callback passes through [`should_emit`] and must increase the
    /// recorded percentage.
    pub fn record_progress(
        &self,
        task_id: &TaskId,
        bytes_sent: u64,
        bytes_expected: u64,
    ) -> Option<ProgressEvent> {
        let current = progress_percent(bytes_sent, bytes_expected)?;
        let mut state = self.lock();
        let task = state.running.get_mut(task_id)?;
        let starting = task.status == UploadStatus::Enqueued && current == 0;
        let emit = starting
            || (current > task.progress && should_emit(task.progress, current, self.step_update));
        if !emit {
            return None;
        }
        task.status = UploadStatus::Running;
        task.progress = current;
        Some(ProgressEvent {
            task_id: task.task_id.clone(),
            status: UploadStatus::Running,
            progress: current,
            tag: task.tag.clone(),
        })
    }

    /// Bring a successful task's progress to 100 if the transport never reported it.
    pub fn complete_progress(&self, task_id: &TaskId) -> Option<ProgressEvent> {
        let mut state = self.lock();
        let task = state.running.get_mut(task_id)?;
        if task.progress >= 100 {
            return None;
        }
        task.status = UploadStatus::Running;
        task.progress = 100;
        Some(ProgressEvent {
            task_id: task.task_id.clone(),
            status: UploadStatus::Running,
            progress: 100,
            tag: task.tag.clone(),
        })
    }

    /// Append a response body chunk. Returns `false` for unknown tasks.
    pub fn append_body(&self, task_id: &TaskId, chunk: &[u8]) -> bool {
        let mut state = self.lock();
        if !state.running.contains_key(task_id) {
            return false;
        }
        state
            .buffers
            .entry(task_id.clone())
            .or_default()
            .extend_from_slice(chunk);
        true
    }

    /// Remove a task at its terminal transition, consuming its response buffer.
    ///
    /// Returns `None` when another transition already removed the task.
    pub fn finish(&self, task_id: &TaskId, status: UploadStatus) -> Option<FinishedTask> {
        let mut state = self.lock();
        let mut task = state.running.remove(task_id)?;
        let body = state.buffers.remove(task_id).unwrap_or_default();
        drop(state);
        task.status = status;
        Some(FinishedTask { task, body })
    }

    /// Remove a task because the caller canceled it.
    pub fn cancel(&self, task_id: &TaskId) -> Option<UploadTask> {
        let mut state = self.lock();
        let mut task = state.running.remove(task_id)?;
        state.buffers.remove(task_id);
        drop(state);
        task.status = UploadStatus::Canceled;
        task.progress = CANCELED_PROGRESS;
        Some(task)
    }

    /// Snapshot of one task.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<UploadTask> {
        self.lock().running.get(task_id).cloned()
    }

    /// Snapshot of every task, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UploadTask> {
        let mut tasks: Vec<UploadTask> = self.lock().running.values().cloned().collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }

    /// Whether the task is tracked.
    #[must_use]
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.lock().running.contains_key(task_id)
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    /// Whether no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().running.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rounded percentage of `sent` over `expected`, clamped to `0..=100`.
///
/// Returns `None` when the expected size is unknown.
#[must_use]
pub fn progress_percent(sent: u64, expected: u64) -> Option<i32> {
    if expected == 0 {
        return None;
    }
    let sent = u128::from(sent.min(expected));
    let expected = u128::from(expected);
    let percent = (sent * 100 + expected / 2) / expected;
    Some(i32::try_from(percent).unwrap_or(100).min(100))
}

/// Throttle rule for progress updates.
///
/// An update is worth emitting when it differs from the previous value and is
/// either the start, a step beyond the threshold, or the end.
#[must_use]
pub const fn should_emit(previous: i32, current: i32, step: i32) -> bool {
    (current == 0 || current > previous.saturating_add(step) || current >= 100)
        && current != previous
}
