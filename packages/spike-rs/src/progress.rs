use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Step-count progress reporting for long-running stages.
///
/// Stages call `step` after each unit of work and poll `is_cancelled`
/// between units; a cancelled stage returns `SpikeError::Cancelled`.
pub trait Progress {
    fn step(&self, _done: usize, _total: usize) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Shared cancellation flag
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

impl Progress for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

/// Adapts a closure `(done, total)` into a progress sink, optionally tied to
/// a cancellation token.
pub struct ProgressFn<F> {
    callback: F,
    token: Option<CancelToken>,
}

impl<F> ProgressFn<F>
where
    F: Fn(usize, usize),
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            token: None,
        }
    }

    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }
}

impl<F> Progress for ProgressFn<F>
where
    F: Fn(usize, usize),
{
    fn step(&self, done: usize, total: usize) {
        (self.callback)(done, total);
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}
