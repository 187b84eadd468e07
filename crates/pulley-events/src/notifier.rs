//! Ordered fan-out of lifecycle events to registered observers.
//!
//! # Design
//! - Observers are kept in registration order and invoked synchronously.
//! - The observer list lock is only held to snapshot the list, never while delivering.

use std::sync::{Arc, PoisonError, RwLock};

use crate::payloads::{ProgressEvent, ResultEvent};

/// Receiver of upload lifecycle events.
pub trait UploadObserver: Send + Sync {
    /// Called for every emitted progress update.
    fn on_progress(&self, event: &ProgressEvent);

    /// Called for every emitted result.
    fn on_result(&self, event: &ResultEvent);
}

/// Synchronous, ordered event fan-out.
#[derive(Clone, Default)]
pub struct EventNotifier {
    observers: Arc<RwLock<Vec<Arc<dyn UploadObserver>>>>,
}

impl EventNotifier {
    /// Construct a notifier with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer; it receives events after every earlier registration.
    pub fn register(&self, observer: Arc<dyn UploadObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a progress update to every observer.
    pub fn emit_progress(&self, event: &ProgressEvent) {
        for observer in self.snapshot() {
            observer.on_progress(event);
        }
    }

    /// Deliver a result to every observer.
    pub fn emit_result(&self, event: &ResultEvent) {
        for observer in self.snapshot() {
            observer.on_result(event);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn UploadObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
