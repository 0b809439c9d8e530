// Arbitrage search over the pool protocol: cycle optimization and path
// enumeration, both cancellable.

pub mod optimizer;
pub mod pathfinder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque cooperative cancellation token. Long-running searches poll it and
/// return an early-termination signal when tripped; math primitives are
/// bounded and never consult it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
