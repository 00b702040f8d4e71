//! Worker launcher: starts one concurrent execution per task.
//!
//! Two dispatch modes share the same [`execute`] body:
//!
//! - Unbounded (no concurrency limit): every task is spawned as its own Tokio
//!   task immediately.
//! - Bounded: a [`WorkerPool`] of `min(limit, N)` workers pulls tasks from a
//!   shared queue.
//!
//! In both modes launching only enqueues or spawns, so the caller is never
//! blocked on task work. Every execution owns its task and a clone of the
//! [`ResultSender`]; nothing else is shared between executions.

use crate::{ResultSender, Task, TaskContext, TaskError, TaskResult, pool::WorkerPool};
use core::{num::NonZeroUsize, panic::AssertUnwindSafe, time::Duration};
use futures::FutureExt;
use std::sync::Arc;
use tokio::{task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;

/// A task paired with its submission index.
pub(crate) struct Job<T, C> {
    pub index: usize,
    pub task: Task<T, C>,
}

/// Starts executions for a run.
pub(crate) struct Launcher<C> {
    shared: Arc<C>,
    concurrency: Option<NonZeroUsize>,
    cancel: CancellationToken,
}

impl<C> Launcher<C>
where
    C: Send + Sync + 'static,
{
    pub const fn new(
        shared: Arc<C>,
        concurrency: Option<NonZeroUsize>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            concurrency,
            cancel,
        }
    }

    /// Launches every task and returns the handle set of the executions.
    ///
    /// `sender` is consumed; once all executions finish, the receiver observes
    /// the channel closing.
    pub fn launch<T>(self, tasks: Vec<Task<T, C>>, sender: ResultSender<T>) -> Executions
    where
        T: Send + 'static,
    {
        let mut set = JoinSet::new();
        let jobs = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| Job { index, task });

        match self.concurrency {
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Launching unbounded executions");

                for job in jobs {
                    let shared = Arc::clone(&self.shared);
                    let sender = sender.clone();
                    let cancel = self.cancel.clone();
                    set.spawn(async move { execute(job, shared, &sender, &cancel).await });
                }
            }
            Some(limit) => {
                let jobs: Vec<_> = jobs.collect();
                let size = limit.get().min(jobs.len());

                #[cfg(feature = "tracing")]
                tracing::debug!("Launching worker pool with {size} workers");

                let pool = WorkerPool::spawn(
                    &mut set,
                    size,
                    Arc::clone(&self.shared),
                    &sender,
                    &self.cancel,
                );
                for job in jobs {
                    pool.submit(job);
                }
                // Dropping the pool closes the queue so idle workers exit.
            }
        }

        Executions { set }
    }
}

/// Runs one task to completion and delivers its result.
///
/// Panics in the task are caught and delivered as [`TaskError::Panicked`].
/// The task is never cut short here: on cancellation it sees the signal
/// through its [`TaskContext`] and returns on its own, and its result is then
/// dropped instead of delivered. A task that ignores the signal is aborted by
/// [`Executions::reap`] once the grace period runs out. A task whose run was
/// cancelled before it started is skipped.
pub(crate) async fn execute<T, C>(
    job: Job<T, C>,
    shared: Arc<C>,
    sender: &ResultSender<T>,
    cancel: &CancellationToken,
) where
    T: Send + 'static,
    C: Send + Sync + 'static,
{
    let Job { index, task } = job;
    let (key, work) = task.into_parts();
    if cancel.is_cancelled() {
        #[cfg(feature = "tracing")]
        tracing::trace!("Task {key} skipped after cancellation");
        return;
    }
    let ctx = TaskContext::new(&key, shared, cancel.clone());

    // Calling `work` inside the future keeps a synchronous panic in the
    // closure body covered by `catch_unwind` as well.
    let outcome = AssertUnwindSafe(async move { work(ctx).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(TaskError::panicked(payload.as_ref())));

    #[cfg(feature = "tracing")]
    {
        if let Err(e) = &outcome {
            tracing::debug!("Task {key} failed: {e}");
        }
    }

    let result = TaskResult::new(index, key, outcome);
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::trace!("Result for task {index} dropped after cancellation");
        }
        sent = sender.send(result) => {
            if let Err(_e) = sent {
                #[cfg(feature = "tracing")]
                tracing::debug!("Failed to deliver result for task {index}: {_e}");
            }
        }
    }
}

/// Handles of every execution started for one run.
pub(crate) struct Executions {
    set: JoinSet<()>,
}

impl Executions {
    #[cfg(any(test, feature = "tracing"))]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Waits for the executions in the background, aborting any still running
    /// after `grace`. Never blocks the caller.
    pub fn reap(mut self, grace: Duration) {
        if self.set.is_empty() {
            return;
        }

        tokio::spawn(async move {
            let drained = timeout(grace, async {
                while let Some(_joined) = self.set.join_next().await {
                    #[cfg(feature = "tracing")]
                    {
                        if let Err(e) = _joined {
                            tracing::error!("Execution terminated abnormally: {e}");
                        }
                    }
                }
            })
            .await;

            if drained.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Aborting {} executions still running after {grace:?}",
                    self.set.len()
                );
                self.set.abort_all();
            }
        });
    }
}
