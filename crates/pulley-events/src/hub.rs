//! Live delivery layer that buffers progress and results until a consumer attaches.

use crate::caching::{CachedEvents, CachingStream};
use crate::notifier::UploadObserver;
use crate::payloads::{ProgressEvent, ResultEvent};

/// Observer exposing separate progress and result streams to consumers.
#[derive(Default)]
pub struct EventHub {
    progress: CachingStream<ProgressEvent>,
    results: CachingStream<ResultEvent>,
}

impl EventHub {
    /// Construct a hub with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a progress listener.
    #[must_use]
    pub fn listen_progress(&self) -> CachedEvents<ProgressEvent> {
        self.progress.listen()
    }

    /// Attach a result listener.
    #[must_use]
    pub fn listen_results(&self) -> CachedEvents<ResultEvent> {
        self.results.listen()
    }

    /// Drop every cached-but-undelivered event.
    pub fn clear(&self) {
        self.progress.clear();
        self.results.clear();
    }

    /// Cached progress and result counts.
    #[must_use]
    pub fn pending(&self) -> (usize, usize) {
        (self.progress.cached_len(), self.results.cached_len())
    }
}

impl UploadObserver for EventHub {
    fn on_progress(&self, event: &ProgressEvent) {
        self.progress.push(event.clone());
    }

    fn on_result(&self, event: &ResultEvent) {
        self.results.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{TaskId, UploadStatus};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn hub_buffers_each_category_independently() {
        let hub = EventHub::new();
        let task_id = TaskId::from("ctx.7");
        hub.on_result(&ResultEvent::Enqueued {
            task_id: task_id.clone(),
            tag: None,
        });
        hub.on_progress(&ProgressEvent {
            task_id: task_id.clone(),
            status: UploadStatus::Running,
            progress: 0,
            tag: None,
        });
        assert_eq!(hub.pending(), (1, 1));

        let mut results = hub.listen_results();
        let first = results.next().await.map(|event| event.kind());
        assert_eq!(first, Some("enqueued"));
        assert_eq!(hub.pending(), (1, 0));

        hub.clear();
        assert_eq!(hub.pending(), (0, 0));
    }
}
