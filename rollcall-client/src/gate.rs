//! Coalesces "tell me when ready" requests onto one preparation round.

use tokio::sync::oneshot;

pub type Waiter<E> = oneshot::Sender<Result<(), E>>;

/// What [`ReadinessGate::admit`] did with a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The gate had an outcome; the waiter already has it.
    Answered,
    /// The waiter is parked. `first` is true when nobody else was waiting.
    Queued { first: bool },
}

/// Parks waiters until preparation resolves, then answers each exactly once.
///
/// A success is final. A failure is final too, until the owner starts a new
/// round with [`ReadinessGate::reopen`].
#[derive(Debug)]
pub struct ReadinessGate<E> {
    outcome: Option<Result<(), E>>,
    waiters: Vec<Waiter<E>>,
    closed: bool,
}

impl<E> Default for ReadinessGate<E> {
    fn default() -> Self {
        Self {
            outcome: None,
            waiters: Vec::new(),
            closed: false,
        }
    }
}

impl<E: Clone> ReadinessGate<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, waiter: Waiter<E>) -> Admission {
        match &self.outcome {
            Some(outcome) => {
                let _ = waiter.send(outcome.clone());
                Admission::Answered
            }
            None => {
                self.waiters.push(waiter);
                Admission::Queued {
                    first: self.waiters.len() == 1,
                }
            }
        }
    }

    /// Record the outcome and answer every parked waiter. Returns how many
    /// were answered. Ignored once the gate is closed.
    pub fn resolve(&mut self, outcome: Result<(), E>) -> usize {
        if self.closed {
            return 0;
        }
        let answered = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
        self.outcome = Some(outcome);
        answered
    }

    /// Forget a failed outcome so later waiters park for the next round.
    pub fn reopen(&mut self) {
        if !self.closed && matches!(self.outcome, Some(Err(_))) {
            self.outcome = None;
        }
    }

    /// Fail everyone, now and forever.
    pub fn close(&mut self, err: E) -> usize {
        let answered = self.resolve(Err(err));
        self.closed = true;
        answered
    }

    pub fn outcome(&self) -> Option<&Result<(), E>> {
        self.outcome.as_ref()
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiter() -> (Waiter<String>, oneshot::Receiver<Result<(), String>>) {
        oneshot::channel()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn parked_waiters_all_get_the_outcome() {
        let mut gate = ReadinessGate::<String>::new();
        let (a, rx_a) = waiter();
        let (b, rx_b) = waiter();

        assert_eq!(gate.admit(a), Admission::Queued { first: true });
        assert_eq!(gate.admit(b), Admission::Queued { first: false });
        assert_eq!(gate.resolve(Ok(())), 2);

        assert_eq!(rx_a.await.expect("a"), Ok(()));
        assert_eq!(rx_b.await.expect("b"), Ok(()));
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn late_waiter_is_answered_immediately() {
        let mut gate = ReadinessGate::<String>::new();
        gate.resolve(Err("offline".to_owned()));

        let (tx, rx) = waiter();
        assert_eq!(gate.admit(tx), Admission::Answered);
        assert_eq!(rx.await.expect("answer"), Err("offline".to_owned()));
    }

    #[test]
    fn reopen_only_clears_failures() {
        let mut gate = ReadinessGate::<String>::new();
        gate.resolve(Err("offline".to_owned()));
        gate.reopen();
        assert_eq!(gate.outcome(), None);

        gate.resolve(Ok(()));
        gate.reopen();
        assert_eq!(gate.outcome(), Some(&Ok(())));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn closed_gate_stays_failed() {
        let mut gate = ReadinessGate::<String>::new();
        let (tx, rx) = waiter();
        gate.admit(tx);
        assert_eq!(gate.close("gone".to_owned()), 1);
        assert_eq!(rx.await.expect("answer"), Err("gone".to_owned()));

        gate.reopen();
        gate.resolve(Ok(()));
        assert_eq!(gate.outcome(), Some(&Err("gone".to_owned())));
    }
}
