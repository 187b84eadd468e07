//! Network condition seam for the constrained context.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the current connection is metered.
pub trait ConnectivityMonitor: Send + Sync {
    /// `true` while only metered connectivity is available.
    fn is_metered(&self) -> bool;
}

/// Monitor whose state is set explicitly.
#[derive(Debug, Default)]
pub struct StaticConnectivity {
    metered: AtomicBool,
}

impl StaticConnectivity {
    /// Monitor starting in the given state.
    #[must_use]
    pub const fn new(metered: bool) -> Self {
        Self {
            metered: AtomicBool::new(metered),
        }
    }

    /// Update the reported state.
    pub fn set_metered(&self, metered: bool) {
        self.metered.store(metered, Ordering::SeqCst);
    }
}

impl ConnectivityMonitor for StaticConnectivity {
    fn is_metered(&self) -> bool {
        self.metered.load(Ordering::SeqCst)
    }
}
