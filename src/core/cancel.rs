//! Cooperative cancellation between the major reconstruction steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{HypertableError, Result};

/// Shared flag checked between the neighbour query, each scored rotation
/// candidate, and rasterization.
///
/// Clones share the same flag, so a UI thread can keep one clone and hand
/// another to the worker running the reconstruction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of any computation holding a clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns [`HypertableError::Cancelled`] once cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HypertableError::Cancelled)
        } else {
            Ok(())
        }
    }
}
