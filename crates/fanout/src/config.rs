use core::{num::NonZeroUsize, time::Duration};

/// Default run deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time background reaping waits for executions before aborting them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Settings for a [`Runner`](crate::Runner).
///
/// The defaults start one execution per task, deliver over a rendezvous
/// result channel, and give collection a 30 second deadline so it can never
/// hang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Deadline for collecting every result, measured from the start of the
    /// run.
    pub timeout: Duration,

    /// Maximum number of tasks in flight. `None` starts every task at once;
    /// `Some(n)` runs a pool of `n` workers over a shared queue.
    pub concurrency: Option<NonZeroUsize>,

    /// Result channel capacity. `0` makes every delivery a rendezvous with the
    /// collector; `K` lets up to `K` results queue before producers wait.
    pub channel_capacity: usize,

    /// How long executions get to wind down after the run ends before they
    /// are aborted. Reaping happens in the background.
    pub shutdown_grace: Duration,
}

impl RunConfig {
    /// Default settings with the given deadline.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.concurrency = None;
        self
    }

    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: None,
            channel_capacity: 0,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}
