//! Observer that records every delivered event for later assertions.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pulley_events::{ProgressEvent, ResultEvent, TaskId, UploadEvent, UploadObserver};

/// Records events in delivery order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UploadEvent>>,
}

impl RecordingObserver {
    /// Construct an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<UploadEvent> {
        self.lock().clone()
    }

    /// Progress values delivered for a task, in order.
    #[must_use]
    pub fn progress_for(&self, task_id: &TaskId) -> Vec<i32> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Progress(progress) if &progress.task_id == task_id => {
                    Some(progress.progress)
                }
                _ => None,
            })
            .collect()
    }

    /// Result events delivered for a task, in order.
    #[must_use]
    pub fn results_for(&self, task_id: &TaskId) -> Vec<ResultEvent> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Result(result) if result.task_id() == task_id => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of terminal results seen for a task (completed, failed or canceled).
    #[must_use]
    pub fn terminal_count(&self, task_id: &TaskId) -> usize {
        self.lock()
            .iter()
            .filter(|event| match event {
                UploadEvent::Result(result) => {
                    result.task_id() == task_id && result.status().is_terminal()
                }
                UploadEvent::Progress(_) => false,
            })
            .count()
    }

    /// Poll until the task has a terminal disposition or `timeout` elapses.
    ///
    /// Returns `true` when a terminal event was observed.
    pub async fn wait_for_terminal(&self, task_id: &TaskId, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.terminal_count(task_id) > 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UploadEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UploadObserver for RecordingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.lock().push(UploadEvent::Progress(event.clone()));
    }

    fn on_result(&self, event: &ResultEvent) {
        self.lock().push(UploadEvent::Result(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulley_events::UploadStatus;

    #[tokio::test]
    async fn records_and_detects_terminal_events() {
        let observer = RecordingObserver::new();
        let task_id = TaskId::from("ctx.a");
        observer.on_result(&ResultEvent::Enqueued {
            task_id: task_id.clone(),
            tag: None,
        });
        observer.on_progress(&ProgressEvent {
            task_id: task_id.clone(),
            status: UploadStatus::Running,
            progress: 40,
            tag: None,
        });
        assert!(!observer.wait_for_terminal(&task_id, Duration::from_millis(30)).await);

        observer.on_progress(&ProgressEvent::canceled(task_id.clone(), None));
        assert!(!observer.wait_for_terminal(&task_id, Duration::from_millis(30)).await);

        observer.on_result(&ResultEvent::Canceled {
            task_id: task_id.clone(),
            tag: None,
        });
        assert!(observer.wait_for_terminal(&task_id, Duration::from_millis(30)).await);
        assert_eq!(observer.progress_for(&task_id), vec![40, -1]);
        assert_eq!(observer.results_for(&task_id).len(), 2);
        assert_eq!(observer.events().len(), 4);
    }
}
