use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::Instrument;

use crate::completion::Completion;
use crate::config::QueueConfig;
use crate::drain::{DrainWaiters, Drained};
use crate::error::{QueueError, TaskError};

pub(crate) const LOG_TARGET: &str = "lexi.queue";

/// How a wrapped job settled its own completion handle.
enum Outcome {
    Completed,
    Failed,
}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, Outcome> + Send>;

struct PendingTask {
    id: u64,
    job: Job,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing queued and no worker running.
    Idle,
    /// At least one task is queued or executing.
    Draining,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Idle => "idle",
            QueueState::Draining => "draining",
        }
    }
}

/// Point-in-time counters for a queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Number of Draining to Idle transitions observed so far.
    pub drains: u64,
    pub pending: usize,
    /// Admission id of the task currently executing, if any.
    pub running: Option<u64>,
    pub drain_waiters: usize,
}

#[derive(Default)]
struct State {
    pending: VecDeque<PendingTask>,
    /// True from the moment a worker is scheduled until it observes an empty deque.
    worker_active: bool,
    current: Option<u64>,
    drain_waiters: DrainWaiters,
}

impl State {
    fn is_quiescent(&self) -> bool {
        self.pending.is_empty() && !self.worker_active
    }
}

#[derive(Default)]
struct Counters {
    next_id: AtomicU64,
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    drains: AtomicU64,
}

struct Shared {
    config: QueueConfig,
    runtime: Handle,
    state: Mutex<State>,
    counters: Counters,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // no user code ever runs while the lock is held, so a poisoned lock
        // still guards a consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs asynchronous tasks one at a time, in admission order.
///
/// Any number of callers may [`enqueue`](Self::enqueue) concurrently. A single
/// worker is started on the runtime when the queue leaves the idle state and it
/// stops itself once the queue is empty again. Cloning the handle shares the
/// same queue.
///
/// There is no timeout or cancellation: a task that never finishes blocks every
/// task admitted after it.
#[derive(Clone)]
pub struct SerialQueue {
    shared: Arc<Shared>,
}

impl SerialQueue {
    /// Builds a queue whose worker runs on the current tokio runtime.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::with_handle(config, runtime))
    }

    /// Builds a queue whose worker runs on `runtime`.
    pub fn with_handle(config: QueueConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                state: Mutex::new(State::default()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Admits `op` at the tail of the queue and returns its completion handle.
    ///
    /// Never blocks. `op` is invoked at most once, by the worker, after every
    /// task admitted before it has finished. An `Err` from the operation is
    /// logged and handed back through the handle; later tasks are unaffected.
    pub fn enqueue<F, Fut, T, E>(&self, op: F) -> Completion<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + fmt::Debug + Send + 'static,
    {
        let id = self.shared.counters.next_id.fetch_add(1, Ordering::Relaxed);
        let (settle, completion) = Completion::channel(id);
        let queue = self.shared.config.name.clone();
        let job: Job = Box::new(move || {
            async move {
                match op().await {
                    Ok(value) => {
                        let _ = settle.send(Ok(value));
                        Outcome::Completed
                    }
                    Err(err) => {
                        tracing::error!(
                            target: LOG_TARGET,
                            queue = %queue,
                            task = id,
                            error = %err,
                            detail = ?err,
                            "error processing task"
                        );
                        let _ = settle.send(Err(TaskError::Failed(err)));
                        Outcome::Failed
                    }
                }
            }
            .boxed()
        });
        self.admit(PendingTask { id, job });
        completion
    }

    /// Resolves once no task is pending and none is executing.
    ///
    /// Ready immediately when the queue is already idle. Otherwise it resolves at
    /// the next Draining to Idle transition, together with every other waiter
    /// registered before it.
    pub fn wait_until_empty(&self) -> Drained {
        let mut state = self.shared.lock_state();
        if state.is_quiescent() {
            return Drained::ready();
        }
        state.drain_waiters.register()
    }

    pub fn state(&self) -> QueueState {
        if self.shared.lock_state().is_quiescent() {
            QueueState::Idle
        } else {
            QueueState::Draining
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == QueueState::Idle
    }

    /// Number of admitted tasks that have not started yet.
    pub fn len(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let (pending, running, drain_waiters) = {
            let state = self.shared.lock_state();
            (state.pending.len(), state.current, state.drain_waiters.len())
        };
        let counters = &self.shared.counters;
        QueueStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
            drains: counters.drains.load(Ordering::Relaxed),
            pending,
            running,
            drain_waiters,
        }
    }

    fn admit(&self, task: PendingTask) {
        let id = task.id;
        let start_worker = {
            let mut state = self.shared.lock_state();
            state.pending.push_back(task);
            self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            !std::mem::replace(&mut state.worker_active, true)
        };
        tracing::trace!(target: LOG_TARGET, queue = %self.name(), task = id, "task admitted");
        if start_worker {
            let shared = Arc::clone(&self.shared);
            self.shared.runtime.spawn(run_worker(shared));
        }
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .field("pending", &self.len())
            .finish()
    }
}

async fn run_worker(shared: Arc<Shared>) {
    tracing::debug!(target: LOG_TARGET, queue = %shared.config.name, "worker started");
    loop {
        let next = {
            let mut state = shared.lock_state();
            match state.pending.pop_front() {
                Some(task) => {
                    state.current = Some(task.id);
                    Some(task)
                }
                None => {
                    state.current = None;
                    state.worker_active = false;
                    shared.counters.drains.fetch_add(1, Ordering::Relaxed);
                    let released = state.drain_waiters.take();
                    drop(state);
                    tracing::debug!(
                        target: LOG_TARGET,
                        queue = %shared.config.name,
                        waiters = released.len(),
                        "queue drained; worker stopping"
                    );
                    released.release();
                    None
                }
            }
        };
        match next {
            Some(task) => execute(&shared, task).await,
            None => return,
        }
    }
}

async fn execute(shared: &Shared, task: PendingTask) {
    let PendingTask { id, job } = task;
    let span = tracing::debug_span!("queue_task", queue = %shared.config.name, task = id);
    let started = Instant::now();
    let run = AssertUnwindSafe(async move { job().await })
        .catch_unwind()
        .instrument(span);
    let result = match shared.config.slow_task_threshold() {
        Some(threshold) => {
            tokio::pin!(run);
            tokio::select! {
                res = &mut run => res,
                _ = tokio::time::sleep(threshold) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        queue = %shared.config.name,
                        task = id,
                        threshold_ms = threshold.as_millis() as u64,
                        "task is still running; later tasks wait until it finishes"
                    );
                    run.await
                }
            }
        }
        None => run.await,
    };
    let counters = &shared.counters;
    match result {
        Ok(Outcome::Completed) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Outcome::Failed) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(panic) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target: LOG_TARGET,
                queue = %shared.config.name,
                task = id,
                panic = %panic_message(panic.as_ref()),
                "task panicked; continuing with the next task"
            );
        }
    }
    tracing::trace!(
        target: LOG_TARGET,
        queue = %shared.config.name,
        task = id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "task finished"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
