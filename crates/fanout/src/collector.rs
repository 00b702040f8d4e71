//! Fan-in side of a run: pulls exactly N results from the result channel.
//!
//! The collector never assumes an arrival order and never waits without a
//! bound. Each pull races three events:
//!
//! - the caller's cancellation token,
//! - the next result on the channel,
//! - the run deadline.
//!
//! Results already queued win over an expired deadline, so work that finished
//! in time is never discarded.

use crate::{Error, Failure, ResultReceiver, TaskResult};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Dispatch/receive counters for a single run.
///
/// Invariant: `received <= dispatched`, with equality exactly when the run has
/// collected every result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    dispatched: usize,
    received: usize,
}

impl RunState {
    pub const fn new(dispatched: usize) -> Self {
        Self {
            dispatched,
            received: 0,
        }
    }

    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub const fn received(&self) -> usize {
        self.received
    }

    pub const fn remaining(&self) -> usize {
        self.dispatched - self.received
    }

    pub const fn is_complete(&self) -> bool {
        self.received == self.dispatched
    }

    fn record(&mut self) {
        debug_assert!(
            self.received < self.dispatched,
            "received more results than dispatched"
        );
        self.received += 1;
    }
}

/// Collects the results of one run.
pub(crate) struct Collector<'a> {
    keys: &'a [String],
    started: Instant,
    deadline: Instant,
}

impl<'a> Collector<'a> {
    /// `keys` are the submitted task keys in submission order; a result's
    /// index refers to a position in this slice.
    pub const fn new(keys: &'a [String], started: Instant, deadline: Instant) -> Self {
        Self {
            keys,
            started,
            deadline,
        }
    }

    /// Pulls results until all `keys.len()` have arrived or the run stops.
    ///
    /// `on_result` sees every accepted result the moment it is pulled.
    /// Returns the collected results in arrival order together with the
    /// run-level error, if any.
    pub async fn collect<T, F>(
        &self,
        rx: &mut ResultReceiver<T>,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> (Vec<TaskResult<T>>, Option<Error>)
    where
        F: FnMut(&TaskResult<T>),
    {
        let mut state = RunState::new(self.keys.len());
        let mut delivered = vec![false; self.keys.len()];
        let mut results = Vec::with_capacity(self.keys.len());

        let deadline = sleep_until(self.deadline);
        tokio::pin!(deadline);

        while !state.is_complete() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        "Run cancelled with {} task(s) outstanding",
                        state.remaining()
                    );
                    let outstanding = self.outstanding(&delivered);
                    return (results, Some(Error::Cancelled { outstanding }));
                }
                next = rx.recv() => {
                    let Some(result) = next else {
                        #[cfg(feature = "tracing")]
                        tracing::error!(
                            "Every producer is gone with {} result(s) missing",
                            state.remaining()
                        );
                        let error = Error::ChannelError {
                            context: format!(
                                "Producers stopped before delivering: {}",
                                self.outstanding(&delivered).join(", ")
                            ),
                        };
                        return (results, Some(error));
                    };

                    match delivered.get_mut(result.index()) {
                        Some(seen) if !*seen => {
                            *seen = true;
                            state.record();
                            on_result(&result);
                            results.push(result);
                        }
                        _ => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(
                                "Ignoring unexpected result for task {}",
                                result.index()
                            );
                        }
                    }
                }
                () = &mut deadline => {
                    let elapsed = self.started.elapsed();
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Run timed out after {elapsed:?} with {} task(s) outstanding",
                        state.remaining()
                    );
                    let outstanding = self.outstanding(&delivered);
                    return (results, Some(Error::Timeout { elapsed, outstanding }));
                }
            }
        }

        let error = partial_failure(&results);
        (results, error)
    }

    fn outstanding(&self, delivered: &[bool]) -> Vec<String> {
        self.keys
            .iter()
            .zip(delivered)
            .filter(|&(_, seen)| !seen)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

fn partial_failure<T>(results: &[TaskResult<T>]) -> Option<Error> {
    let mut failed: Vec<_> = results
        .iter()
        .filter_map(|r| r.failure().map(|e| (r.index(), r.key(), e)))
        .collect();
    if failed.is_empty() {
        return None;
    }
    failed.sort_unstable_by_key(|&(index, ..)| index);

    Some(Error::PartialFailure {
        total: results.len(),
        failures: failed
            .into_iter()
            .map(|(_, key, error)| Failure {
                key: key.to_string(),
                error: error.clone(),
            })
            .collect(),
    })
}
