use crate::{Error, Result, TaskResult};
use core::time::Duration;

/// Everything a run produced: the collected results and the run-level error.
///
/// Results are in arrival order. They are kept even when the run fails, so a
/// caller can use what finished and resubmit only [`Error::retry_keys`].
#[derive(Debug)]
pub struct RunReport<T> {
    results: Vec<TaskResult<T>>,
    error: Option<Error>,
    elapsed: Duration,
}

impl<T> RunReport<T> {
    pub(crate) const fn new(
        results: Vec<TaskResult<T>>,
        error: Option<Error>,
        elapsed: Duration,
    ) -> Self {
        Self {
            results,
            error,
            elapsed,
        }
    }

    pub fn results(&self) -> &[TaskResult<T>] {
        &self.results
    }

    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Time from launch until collection stopped.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Looks up the first result delivered for `key`.
    pub fn get(&self, key: &str) -> Option<&TaskResult<T>> {
        self.results.iter().find(|r| r.key() == key)
    }

    /// Successful values, in arrival order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(TaskResult::value)
    }

    pub fn into_parts(self) -> (Vec<TaskResult<T>>, Option<Error>) {
        (self.results, self.error)
    }

    /// Converts into a `Result`, discarding the collected results on error.
    ///
    /// # Errors
    ///
    /// Returns the run-level error if there was one.
    pub fn into_result(self) -> Result<Vec<TaskResult<T>>> {
        match self.error {
            None => Ok(self.results),
            Some(e) => Err(e),
        }
    }
}
