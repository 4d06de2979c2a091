//! Cooperative cancellation.
//!
//! The original engine polls a process-wide `SigInt` flag inside its scan
//! loop. This crate takes an explicit token instead, checked at the same
//! loop boundaries (scan and lazy-parse, per the concurrency model — a sync
//! in progress is never cancellable).

use std::sync::atomic::{AtomicBool, Ordering};

pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

/// A token that never fires, for callers that don't need cancellation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A token a signal handler (or any other thread) can flip.
#[derive(Debug, Default)]
pub struct AtomicCancellationToken(AtomicBool);

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
