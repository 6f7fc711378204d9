use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of runs currently holding a graph.
#[derive(Debug, Clone, Default)]
pub struct ActiveRuns(Arc<AtomicUsize>);

impl ActiveRuns {
    pub fn acquire(&self) -> RunLease {
        self.0.fetch_add(1, Ordering::SeqCst);
        RunLease(self.0.clone())
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct RunLease(Arc<AtomicUsize>);

impl Drop for RunLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
