//! Cancellable one-shot timer for select loops.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::Sleep;

/// A one-shot timer that can be re-armed or cancelled at any time.
///
/// Designed for `tokio::select!` loops: [`fired`](Timer::fired) resolves when
/// an armed deadline elapses and pends forever while disarmed, so a disarmed
/// timer simply never wins the select. Firing disarms the timer.
#[derive(Debug, Default)]
pub struct Timer {
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    /// Create a disarmed timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer to fire after `delay`.
    pub fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Disarm the timer; a pending [`fired`](Timer::fired) stops resolving.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve when the armed deadline elapses; pend forever while disarmed.
    ///
    /// Cancel-safe: dropping the returned future leaves the deadline intact.
    pub async fn fired(&mut self) {
        poll_fn(|cx| match self.deadline.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx),
            None => Poll::Pending,
        })
        .await;
        self.deadline = None;
    }
}
