//! Buffering stream for consumers that attach after events were emitted.
//!
//! # Design
//! - Without a live listener every item is cached in arrival order.
//! - Attaching a listener flushes the cache oldest-first, then items flow straight through.
//! - A listener that goes away silently returns the stream to caching mode.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Stream handed to a listener when it attaches.
pub type CachedEvents<T> = UnboundedReceiverStream<T>;

/// Item buffer that replays to the next listener.
pub struct CachingStream<T> {
    state: Mutex<CacheState<T>>,
}

struct CacheState<T> {
    cache: VecDeque<T>,
    sink: Option<UnboundedSender<T>>,
}

impl<T: Send + 'static> CachingStream<T> {
    /// Construct an empty stream with no listener.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                cache: VecDeque::new(),
                sink: None,
            }),
        }
    }

    /// Deliver an item to the listener, or cache it when none is attached.
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        let item = match state.sink.as_ref() {
            Some(sink) => match sink.send(item) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => item,
        };
        state.sink = None;
        state.cache.push_back(item);
    }

    /// Attach a listener, replacing any previous one.
    ///
    /// Cached items are delivered first, oldest first.
    #[must_use]
    pub fn listen(&self) -> CachedEvents<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        while let Some(item) = state.cache.pop_front() {
            if let Err(returned) = sender.send(item) {
                state.cache.push_front(returned.0);
                break;
            }
        }
        state.sink = Some(sender);
        drop(state);
        UnboundedReceiverStream::new(receiver)
    }

    /// Detach the current listener; later items are cached again.
    pub fn detach(&self) {
        self.lock().sink = None;
    }

    /// Drop cached items that were never delivered.
    pub fn clear(&self) {
        self.lock().cache.clear();
    }

    /// Number of items waiting for a listener.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.lock().cache.len()
    }

    /// Whether a listener is currently attached.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.lock()
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Default for CachingStream<T> {
    fn default() -> Self {
        Self::new()
    }
}
