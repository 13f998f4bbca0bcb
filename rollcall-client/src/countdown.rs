use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A fan-in barrier: `wait` returns once `arrive` has been called `count`
/// times. A count of zero is already done.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicUsize,
    done: Notify,
}

impl Countdown {
    pub fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(count),
            done: Notify::new(),
        })
    }

    /// Count one arrival and return how many are still outstanding.
    /// Arrivals past zero are ignored.
    pub fn arrive(&self) -> usize {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.done.notify_waiters();
        }
        previous.saturating_sub(1)
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}
