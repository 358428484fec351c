//! Progress reporting and cooperative cancellation
//!
//! Long-running operations receive a [`StepContext`]. They report sub-steps
//! (one per extracted feature, one per predicted row) and call
//! [`StepContext::checkpoint`] at the same boundaries, which surfaces a
//! cancellation request as [`Error::Cancelled`].

use dtclassifier_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Position of a run: which step, and how far into it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub step_index: usize,
    pub step_count: usize,
    pub sub_step_index: usize,
    pub sub_step_count: usize,
}

impl ProgressEvent {
    /// Overall completion in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.step_count == 0 {
            return 1.0;
        }
        let within = if self.sub_step_count == 0 {
            0.0
        } else {
            self.sub_step_index as f64 / self.sub_step_count as f64
        };
        ((self.step_index as f64 + within) / self.step_count as f64).clamp(0.0, 1.0)
    }
}

/// Receiver of progress events
pub trait ProgressSink {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once [`CancelToken::cancel`] has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress and cancellation handle for one step of a run
pub struct StepContext<'a> {
    step_index: usize,
    step_count: usize,
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> StepContext<'a> {
    pub fn new(step_index: usize, step_count: usize, sink: &'a dyn ProgressSink, cancel: CancelToken) -> Self {
        Self {
            step_index,
            step_count,
            sink,
            cancel,
        }
    }

    /// A context that reports nowhere and is never cancelled
    pub fn detached() -> StepContext<'static> {
        StepContext {
            step_index: 0,
            step_count: 1,
            sink: &NoProgress,
            cancel: CancelToken::new(),
        }
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn sub_step(&self, index: usize, count: usize) {
        self.sink.report(ProgressEvent {
            step_index: self.step_index,
            step_count: self.step_count,
            sub_step_index: index,
            sub_step_count: count,
        });
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink_receives_events() {
        let seen = RefCell::new(Vec::new());
        let sink = |e: ProgressEvent| seen.borrow_mut().push(e);
        let ctx = StepContext::new(2, 5, &sink, CancelToken::new());
        ctx.sub_step(3, 10);
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].step_index, 2);
        assert_eq!(events[0].sub_step_index, 3);
        assert!((events[0].fraction() - 0.46).abs() < 1e-12);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let ctx = StepContext::new(0, 1, &NoProgress, token.clone());
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(Error::Cancelled)));
    }
}
