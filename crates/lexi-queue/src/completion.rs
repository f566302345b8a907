use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TaskError;

pub(crate) type Settle<T, E> = oneshot::Sender<Result<T, TaskError<E>>>;

/// Outcome of one enqueued task.
///
/// Dropping the handle does not withdraw the task; it still runs in its turn and
/// its result is discarded.
#[must_use = "the task runs regardless, but its outcome is lost unless awaited"]
#[derive(Debug)]
pub struct Completion<T, E> {
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
    id: u64,
}

impl<T, E> Completion<T, E> {
    pub(crate) fn channel(id: u64) -> (Settle<T, E>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, id })
    }

    /// Admission sequence number of the task, unique within its queue.
    pub fn task_id(&self) -> u64 {
        self.id
    }
}

impl<T, E> Future for Completion<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
