//! Cooperative progress reporting and cancellation.
//!
//! Long evaluations report progress and poll for cancellation at coarse
//! boundaries only (between requirements, fields, or wavelengths), never
//! inside a tight numerical loop. The token is a shared atomic flag so a
//! caller on another thread can cancel without any locking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress callback: percentage in `[0, 100]` and a short message.
pub type ProgressFn<'a> = dyn Fn(f64, &str) + 'a;

/// Shared cancellation flag. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Progress sink handed through long-running entry points.
///
/// `Progress::default()` is inert: no callback and a token nobody cancels.
#[derive(Default)]
pub struct Progress<'a> {
    pub on_progress: Option<&'a ProgressFn<'a>>,
    pub cancel: CancelToken,
}

impl<'a> Progress<'a> {
    pub fn with_callback(callback: &'a ProgressFn<'a>) -> Progress<'a> {
        Progress {
            on_progress: Some(callback),
            cancel: CancelToken::new(),
        }
    }

    /// Report progress at a chunk boundary.
    pub fn report(&self, percent: f64, message: &str) {
        if let Some(cb) = self.on_progress {
            cb(percent.clamp(0.0, 100.0), message);
        }
    }

    /// True when the caller has requested cancellation.
    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
