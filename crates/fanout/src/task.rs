use crate::{BoxError, TaskError};
use core::{fmt, future::Future, pin::Pin};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Boxed future produced by a task's work once it has been started.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send + 'static>>;

type Work<T, C> = Box<dyn FnOnce(TaskContext<C>) -> TaskFuture<T> + Send + 'static>;

/// A keyed unit of work producing a single value or a single failure.
///
/// The work is a one-shot closure receiving a [`TaskContext`] and returning a
/// future. It is not started until the runner launches it, and it is immutable
/// once created.
///
/// `C` is the runner's shared context type; tasks that need nothing from the
/// caller use the default `()`.
///
/// # Example
///
/// ```
/// use fanout::Task;
///
/// let task: Task<String> = Task::new("Google.com", |ctx| async move {
///     Ok::<_, &str>(format!("{} is done!", ctx.key()))
/// });
/// assert_eq!(task.key(), "Google.com");
/// ```
pub struct Task<T, C = ()> {
    key: String,
    work: Work<T, C>,
}

impl<T, C> Task<T, C>
where
    T: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Creates a task from a key and an async operation.
    ///
    /// The operation may fail with anything convertible into a boxed error
    /// (`&str`, `String`, any `std::error::Error`); the failure is captured in
    /// the task's result as [`TaskError::Failed`].
    pub fn new<F, Fut, E>(key: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(TaskContext<C>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            key: key.into(),
            work: Box::new(move |ctx| -> TaskFuture<T> {
                Box::pin(async move { work(ctx).await.map_err(TaskError::failed) })
            }),
        }
    }
}

impl<T, C> Task<T, C> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn into_parts(self) -> (String, Work<T, C>) {
        (self.key, self.work)
    }
}

impl<T, C> fmt::Debug for Task<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Per-execution handle passed to a task's work.
///
/// Carries the task key, the runner's shared context and the run's
/// cancellation token. Long-running work should check
/// [`TaskContext::is_cancelled`] or await [`TaskContext::cancelled`] between
/// steps so it stops promptly once the run is abandoned.
pub struct TaskContext<C = ()> {
    key: Arc<str>,
    shared: Arc<C>,
    cancel: CancellationToken,
}

impl<C> TaskContext<C> {
    pub(crate) fn new(key: &str, shared: Arc<C>, cancel: CancellationToken) -> Self {
        Self {
            key: Arc::from(key),
            shared,
            cancel,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The shared context the runner was built with.
    pub fn shared(&self) -> &C {
        &self.shared
    }

    pub fn shared_arc(&self) -> Arc<C> {
        Arc::clone(&self.shared)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run has been cancelled or has timed out.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl<C> Clone for TaskContext<C> {
    fn clone(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            shared: Arc::clone(&self.shared),
            cancel: self.cancel.clone(),
        }
    }
}

impl<C> fmt::Debug for TaskContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("key", &self.key)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The outcome of one task, delivered exactly once to the collector.
///
/// Exactly one of value or failure is present.
#[derive(Debug)]
pub struct TaskResult<T> {
    index: usize,
    key: String,
    outcome: Result<T, TaskError>,
}

impl<T> TaskResult<T> {
    pub(crate) const fn new(index: usize, key: String, outcome: Result<T, TaskError>) -> Self {
        Self {
            index,
            key,
            outcome,
        }
    }

    /// Position of the originating task in the submitted sequence.
    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn outcome(&self) -> &Result<T, TaskError> {
        &self.outcome
    }

    pub fn into_outcome(self) -> Result<T, TaskError> {
        self.outcome
    }

    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    pub fn into_value(self) -> Option<T> {
        self.outcome.ok()
    }
}
