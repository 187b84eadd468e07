//! Sharded workers draining transport callbacks.
//!
//! # Design
//! - Each unit's events hash to a single shard, so per-unit order is preserved.
//! - Distinct units may be handled concurrently on different shards.
//! - Channels are unbounded; events emitted before the workers start are buffered.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use pulley_events::TaskId;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{TransportDelegate, TransportEvent};

#[derive(Clone)]
pub(crate) struct CallbackDispatcher {
    shards: Arc<Vec<UnboundedSender<TransportEvent>>>,
}

impl CallbackDispatcher {
    pub(crate) fn new(workers: usize) -> (Self, CallbackWorkers) {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..workers.max(1)).map(|_| mpsc::unbounded_channel()).unzip();
        (
            Self {
                shards: Arc::new(senders),
            },
            CallbackWorkers { receivers },
        )
    }

    pub(crate) fn send(&self, event: TransportEvent) {
        let index = shard_for(event.task_id(), self.shards.len());
        let Some(shard) = self.shards.get(index) else {
            return;
        };
        if let Err(err) = shard.send(event) {
            debug!(
                task_id = %err.0.task_id(),
                "callback workers stopped; dropping transport event"
            );
        }
    }
}

/// Receivers waiting to be attached to a delegate.
pub struct CallbackWorkers {
    receivers: Vec<UnboundedReceiver<TransportEvent>>,
}

impl CallbackWorkers {
    /// Number of workers that [`CallbackWorkers::spawn`] will start.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// Whether no workers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Start one task per shard, each feeding the delegate until the session is dropped.
    pub fn spawn(self, delegate: Arc<dyn TransportDelegate>) -> Vec<JoinHandle<()>> {
        self.receivers
            .into_iter()
            .enumerate()
            .map(|(index, mut receiver)| {
                let delegate = Arc::clone(&delegate);
                tokio::spawn(async move {
                    while let Some(event) = receiver.recv().await {
                        delegate.handle(event);
                    }
                    debug!(worker = index, "transport callback worker stopped");
                })
            })
            .collect()
    }
}

fn shard_for(task_id: &TaskId, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    task_id.hash(&mut hasher);
    let shards = u64::try_from(shards.max(1)).unwrap_or(1);
    usize::try_from(hasher.finish() % shards).unwrap_or(0)
}
