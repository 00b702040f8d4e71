//! Entry points tying the launcher, result channel and collector together.
//!
//! A run proceeds in four phases:
//!
//! 1. Open a result channel sized by [`RunConfig::channel_capacity`].
//! 2. Launch every task (unbounded, or through a worker pool).
//! 3. Collect N results against the deadline and the caller's token.
//! 4. Cancel the run token, close and drain the channel, and reap executions in
//!    the background.
//!
//! Phase 4 runs on every exit path and never blocks the caller.

use crate::{
    RunConfig, RunReport, Task, TaskResult, collector::Collector, launcher::Launcher,
    result_channel,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

/// Roughly 30 years. Deadlines that would overflow `Instant` are clamped here.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline `timeout` after `started`, clamped so huge timeouts such as
/// [`Duration::MAX`] mean "no deadline" instead of overflowing.
fn deadline_after(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout)
        .unwrap_or_else(|| started + FAR_FUTURE)
}

/// Runs `tasks` concurrently and collects their results within `timeout`.
///
/// Every task is started at once and results travel over a rendezvous
/// channel. Use a [`Runner`] for a concurrency limit, a buffered channel, a
/// shared context or caller-driven cancellation.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use fanout::{Task, run};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tasks = ["Google.com", "Amazon.com", "Github.com"]
///     .into_iter()
///     .map(|site| {
///         Task::new(site, move |_| async move {
///             tokio::time::sleep(Duration::from_millis(20)).await;
///             Ok::<_, &str>(format!("{site} is done!"))
///         })
///     })
///     .collect();
///
/// let report = run(tasks, Duration::from_secs(5)).await;
/// assert!(report.is_success());
/// assert_eq!(report.results().len(), 3);
/// # }
/// ```
pub async fn run<T>(tasks: Vec<Task<T>>, timeout: Duration) -> RunReport<T>
where
    T: Send + 'static,
{
    Runner::new(RunConfig::new(timeout)).run(tasks).await
}

/// Reusable fan-out/fan-in runner.
///
/// Holds the [`RunConfig`] and the shared context `C` handed to every task
/// through [`TaskContext::shared`](crate::TaskContext::shared). The runner
/// owns the context; it is released when the runner and every task holding a
/// handle to it are dropped.
#[derive(Debug)]
pub struct Runner<C = ()> {
    config: RunConfig,
    shared: Arc<C>,
}

impl Runner<()> {
    pub fn new(config: RunConfig) -> Self {
        Self::with_shared(config, Arc::new(()))
    }
}

impl<C> Runner<C>
where
    C: Send + Sync + 'static,
{
    /// Creates a runner whose tasks all receive `context`.
    pub fn with_context(config: RunConfig, context: C) -> Self {
        Self::with_shared(config, Arc::new(context))
    }

    pub const fn with_shared(config: RunConfig, shared: Arc<C>) -> Self {
        Self { config, shared }
    }

    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn context(&self) -> &C {
        &self.shared
    }

    /// Runs `tasks` until every result arrives or the deadline passes.
    pub async fn run<T>(&self, tasks: Vec<Task<T, C>>) -> RunReport<T>
    where
        T: Send + 'static,
    {
        self.run_with_cancel(tasks, &CancellationToken::new()).await
    }

    /// Like [`Runner::run`], but also stops when `cancel` fires.
    ///
    /// Cancelling signals in-flight executions through a child of `cancel`.
    /// Tasks observe it through [`TaskContext`](crate::TaskContext) and
    /// return on their own; whatever they produce afterwards is dropped, and
    /// any still running after [`RunConfig::shutdown_grace`] are aborted. The
    /// report carries [`Error::Cancelled`](crate::Error::Cancelled) with the
    /// outstanding keys.
    pub async fn run_with_cancel<T>(
        &self,
        tasks: Vec<Task<T, C>>,
        cancel: &CancellationToken,
    ) -> RunReport<T>
    where
        T: Send + 'static,
    {
        self.run_with(tasks, cancel, |_| {}).await
    }

    /// Like [`Runner::run_with_cancel`], calling `on_result` with every result
    /// as soon as it is collected, in arrival order.
    ///
    /// The callback runs on the collecting task, so it should not block.
    ///
    /// # Example
    ///
    /// ```
    /// use core::time::Duration;
    /// use fanout::{CancellationToken, RunConfig, Runner, Task};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let tasks = ["Google.com", "Amazon.com"]
    ///     .into_iter()
    ///     .map(|site| Task::new(site, |_| async { Ok::<_, &str>(()) }))
    ///     .collect();
    ///
    /// let runner = Runner::new(RunConfig::new(Duration::from_secs(1)));
    /// let mut arrived = Vec::new();
    /// let report = runner
    ///     .run_with(tasks, &CancellationToken::new(), |r| {
    ///         arrived.push(r.key().to_string());
    ///     })
    ///     .await;
    /// assert!(report.is_success());
    /// assert_eq!(arrived.len(), 2);
    /// # }
    /// ```
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(tasks = tasks.len())))]
    pub async fn run_with<T, F>(
        &self,
        tasks: Vec<Task<T, C>>,
        cancel: &CancellationToken,
        on_result: F,
    ) -> RunReport<T>
    where
        T: Send + 'static,
        F: FnMut(&TaskResult<T>),
    {
        let started = Instant::now();
        let deadline = deadline_after(started, self.config.timeout);
        let keys: Vec<String> = tasks.iter().map(|t| t.key().to_string()).collect();

        let run_token = cancel.child_token();
        let (sender, mut receiver) = result_channel(self.config.channel_capacity);

        let executions = Launcher::new(
            Arc::clone(&self.shared),
            self.config.concurrency,
            run_token.clone(),
        )
        .launch(tasks, sender);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Dispatched {} task(s) on {} execution(s)",
            keys.len(),
            executions.len()
        );

        let (results, error) = Collector::new(&keys, started, deadline)
            .collect(&mut receiver, cancel, on_result)
            .await;

        // Stop anything still in flight, then unblock producers parked on the
        // channel without waiting on them.
        run_token.cancel();
        receiver.close();
        let _drained = receiver.drain();
        executions.reap(self.config.shutdown_grace);

        #[cfg(feature = "tracing")]
        {
            match &error {
                None => tracing::info!(
                    "Collected {} result(s) in {:?}",
                    results.len(),
                    started.elapsed()
                ),
                Some(e) => tracing::warn!(
                    "Run ended with {} result(s): {e} ({_drained} drained)",
                    results.len()
                ),
            }
        }

        RunReport::new(results, error, started.elapsed())
    }
}
