//! Cancellation token (spec §5, §9): polled at record boundaries in the
//! window and encoder, and before each retro-patch write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PostProcessError, Result};

/// A cheaply-cloned handle that can be tripped from another thread (or the
/// same thread, e.g. a signal handler) to request the pipeline stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(PostProcessError::Cancelled)` if the token has tripped.
    /// Call at every record boundary (spec §5).
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PostProcessError::Cancelled)
        } else {
            Ok(())
        }
    }
}
