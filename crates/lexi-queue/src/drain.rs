use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Resolves once the queue has no pending task and nothing in flight.
///
/// Returned by [`SerialQueue::wait_until_empty`](crate::SerialQueue::wait_until_empty).
/// A handle created while the queue is already idle is ready on first poll.
#[must_use = "a Drained handle does nothing unless awaited"]
#[derive(Debug)]
pub struct Drained {
    rx: Option<oneshot::Receiver<()>>,
}

impl Drained {
    pub(crate) fn ready() -> Self {
        Self { rx: None }
    }

    /// True when the handle was created on the idle fast path.
    pub fn is_immediate(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Drained {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.as_mut() {
            None => Poll::Ready(()),
            // A closed sender means the worker went away with the runtime; there is
            // nothing left that could ever drain, so stop waiting.
            Some(rx) => Pin::new(rx).poll(cx).map(|_| ()),
        }
    }
}

/// One-shot signals registered by callers of `wait_until_empty`.
#[derive(Debug, Default)]
pub(crate) struct DrainWaiters {
    waiters: Vec<oneshot::Sender<()>>,
}

impl DrainWaiters {
    pub(crate) fn register(&mut self) -> Drained {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Drained { rx: Some(rx) }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Detaches every registered waiter so they can be released outside the lock.
    pub(crate) fn take(&mut self) -> ReleasedWaiters {
        ReleasedWaiters(std::mem::take(&mut self.waiters))
    }
}

pub(crate) struct ReleasedWaiters(Vec<oneshot::Sender<()>>);

impl ReleasedWaiters {
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn release(self) {
        for waiter in self.0 {
            // receiver may have been dropped by an impatient caller
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_handle_resolves_immediately() {
        let drained = Drained::ready();
        assert!(drained.is_immediate());
        drained.await;
    }

    #[tokio::test]
    async fn release_wakes_every_registered_waiter() {
        let mut waiters = DrainWaiters::default();
        let first = waiters.register();
        let second = waiters.register();
        let dropped = waiters.register();
        drop(dropped);
        assert_eq!(waiters.len(), 3);
        assert!(!first.is_immediate());

        let released = waiters.take();
        assert_eq!(waiters.len(), 0);
        assert_eq!(released.len(), 3);
        released.release();

        first.await;
        second.await;
    }

    #[tokio::test]
    async fn dropped_sender_stops_the_wait() {
        let mut waiters = DrainWaiters::default();
        let handle = waiters.register();
        drop(waiters);
        handle.await;
    }
}
