//! Pluggable perceptual-difference primitives.
//!
//! A [`DiffPrimitive`] scores two images and writes a composite
//! visualisation of their differences. The scheduler and aggregator only see
//! this trait, so an in-process implementation ([`PixelDiff`]) and an
//! external tool ([`CommandDiff`]) are interchangeable.

pub mod command;
pub mod pixel;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::DiffError;

pub use command::CommandDiff;
pub use pixel::PixelDiff;

/// Scores the difference between a blessed and a current image.
///
/// The returned future must not complete while work it started (blocking
/// jobs, child processes) is still running: the caller releases the
/// comparison's concurrency slot as soon as it does.
#[async_trait]
pub trait DiffPrimitive: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Compare `blessed` against `current`, writing the composite to
    /// `diff_out`. Returns a non-negative score; `0.0` means identical.
    ///
    /// `cancel` fires when the comparison has overrun its timeout; the
    /// result is discarded after that, so stop as early as possible.
    async fn diff(
        &self,
        blessed: &Path,
        current: &Path,
        diff_out: &Path,
        cancel: &CancelSignal,
    ) -> Result<f64, DiffError>;
}

/// Stop request for one running comparison. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// `Err(Cancelled)` once cancelled; for checkpoints in blocking code.
    pub fn checkpoint(&self) -> Result<(), DiffError> {
        if self.is_cancelled() {
            Err(DiffError::Cancelled)
        } else {
            Ok(())
        }
    }
}
