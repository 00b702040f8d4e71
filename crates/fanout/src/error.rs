//! Error types for task execution and run collection.
//!
//! Two layers of failure exist:
//!
//! - [`TaskError`]: a single task's operation failed. It is captured inside the
//!   task's [`TaskResult`] and never aborts sibling executions.
//! - [`Error`]: the run as a whole did not complete cleanly. It is surfaced to
//!   the caller alongside every result that was collected.
//!
//! ## Error Cases
//! - `Timeout`: fewer than N results arrived before the deadline.
//! - `PartialFailure`: all N results arrived but some carry a [`TaskError`].
//! - `Cancelled`: the caller cancelled the run mid-collection.
//! - `ChannelError`: the result channel failed (closed, or every producer went
//!   away before N results were delivered).
//!
//! [`TaskResult`]: crate::TaskResult

use core::{fmt, time::Duration};
use std::{any::Any, sync::Arc};

/// Boxed error accepted from task operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Failure of a single task, recovered locally into its result.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TaskError {
    /// The task's operation returned an error.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The task's operation panicked. The payload message is kept when it is a
    /// string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task observed cancellation and gave up without a value.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Wraps any error returned by a task's operation.
    ///
    /// A [`TaskError`] passed through here is kept as-is rather than nested.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        match err.into().downcast::<Self>() {
            Ok(err) => *err,
            Err(other) => Self::Failed(Arc::from(other)),
        }
    }

    pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A failed task inside a [`Error::PartialFailure`] report.
#[derive(Clone, Debug)]
pub struct Failure {
    pub key: String,
    pub error: TaskError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Run-level error returned by the collector.
///
/// Every variant leaves the results that *were* collected available on the
/// [`RunReport`](crate::RunReport).
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The deadline passed before every task delivered a result.
    #[error(
        "Timed out after {elapsed:?} waiting on {}: {}",
        .outstanding.len(),
        .outstanding.join(", ")
    )]
    Timeout {
        elapsed: Duration,
        /// Keys of the tasks without a result, in submission order.
        outstanding: Vec<String>,
    },

    /// Every task delivered a result but some of them failed.
    #[error("{} of {total} task(s) failed: {}", .failures.len(), join_failures(.failures))]
    PartialFailure {
        total: usize,
        /// Failed tasks, in submission order.
        failures: Vec<Failure>,
    },

    /// The caller cancelled the run before every task delivered a result.
    #[error("Run cancelled with {} task(s) outstanding", .outstanding.len())]
    Cancelled { outstanding: Vec<String> },

    /// Internal channel failure (e.g., closed channel or vanished producers).
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Keys of the tasks a caller would resubmit to retry this run.
    ///
    /// Failed keys for [`Error::PartialFailure`], outstanding keys for
    /// [`Error::Timeout`] and [`Error::Cancelled`].
    pub fn retry_keys(&self) -> Vec<&str> {
        match self {
            Self::Timeout { outstanding, .. } | Self::Cancelled { outstanding } => {
                outstanding.iter().map(String::as_str).collect()
            }
            Self::PartialFailure { failures, .. } => {
                failures.iter().map(|f| f.key.as_str()).collect()
            }
            Self::ChannelError { .. } => Vec::new(),
        }
    }
}

fn join_failures(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
