//! Pre-readiness task queue.
//!
//! Calls made before the backend finishes initializing are parked here and
//! replayed in submission order once it does. If initialization fails every
//! parked call receives the same failure instead.

use crate::error::{RelayError, Result};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use tracing::debug;

/// Outcome handed to each deferred task.
pub type TaskOutcome<'a, T> = std::result::Result<&'a T, &'a RelayError>;

type Task<T> = Box<dyn for<'a> FnOnce(TaskOutcome<'a, T>) + Send>;

enum QueueState<T> {
    Pending,
    Ready(T),
    Failed(RelayError),
}

struct Inner<T> {
    state: QueueState<T>,
    tasks: VecDeque<Task<T>>,
    /// True while settled tasks are being replayed.
    draining: bool,
}

/// Defers tasks until the backend signals readiness or failure.
///
/// Every task runs exactly once. Tasks submitted after settlement run
/// immediately, unless a replay is still in progress, in which case they
/// join the back of the replay so submission order is never broken.
pub struct TaskQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> TaskQueue<T> {
    /// Create an unsettled queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: QueueState::Pending,
                tasks: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// Whether the backend is ready; callers may bypass the queue once true.
    pub fn is_ready(&self) -> bool {
        matches!(self.inner.lock().state, QueueState::Ready(_))
    }

    /// Whether initialization failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.inner.lock().state, QueueState::Failed(_))
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Submit a task.
    ///
    /// The task receives the ready value, or the initialization failure.
    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce(TaskOutcome<'_, T>) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let outcome = match &inner.state {
            QueueState::Pending => None,
            _ if inner.draining => None,
            QueueState::Ready(value) => Some(Ok(value.clone())),
            QueueState::Failed(err) => Some(Err(err.clone())),
        };

        match outcome {
            None => inner.tasks.push_back(Box::new(task)),
            Some(outcome) => {
                drop(inner);
                match &outcome {
                    Ok(value) => task(Ok(value)),
                    Err(err) => task(Err(err)),
                }
            }
        }
    }

    /// Resolves with the ready value once the queue settles.
    ///
    /// The wait is registered when this is called, not when the future is
    /// first polled, so it keeps its place in submission order.
    pub fn wait_ready(&self) -> impl Future<Output = Result<T>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.add_task(move |outcome| {
            let _ = tx.send(outcome.map(T::clone).map_err(RelayError::clone));
        });
        async move { rx.await.map_err(|_| RelayError::QueueClosed)? }
    }

    /// Mark the backend ready and replay every parked task with `value`.
    ///
    /// Ignored if the queue has already settled.
    pub fn ready(&self, value: T) {
        debug!(pending = self.pending(), "task queue ready");
        self.settle(QueueState::Ready(value));
    }

    /// Mark initialization failed and hand `err` to every parked task.
    ///
    /// Ignored if the queue has already settled.
    pub fn fail(&self, err: RelayError) {
        debug!(pending = self.pending(), error = %err, "task queue failed");
        self.settle(QueueState::Failed(err));
    }

    fn settle(&self, state: QueueState<T>) {
        let outcome = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, QueueState::Pending) {
                return;
            }
            let outcome = match &state {
                QueueState::Ready(value) => Ok(value.clone()),
                QueueState::Failed(err) => Err(err.clone()),
                QueueState::Pending => return,
            };
            inner.state = state;
            inner.draining = true;
            outcome
        };

        loop {
            let task = {
                let mut inner = self.inner.lock();
                match inner.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        inner.draining = false;
                        break;
                    }
                }
            };
            match &outcome {
                Ok(value) => task(Ok(value)),
                Err(err) => task(Err(err)),
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
