//! Worker pool for concurrency-limited runs.
//!
//! This module defines the [`WorkerPool`] struct, which feeds a fixed set of
//! Tokio workers from a single shared queue. Unlike round-robin routing, a
//! shared queue hands the next job to whichever worker frees up first, so one
//! slow task never holds back jobs queued behind it.
//!
//! The queue is unbounded: every job of a run is known up front, so submitting
//! never waits. Workers stop once the queue is closed and empty, or as soon as
//! the run's [`CancellationToken`] fires.

use super::worker::worker_loop;
use crate::{ResultSender, launcher::Job};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

/// Shared job queue pulled by every worker of a pool.
pub(crate) type JobQueue<T, C> = Arc<Mutex<mpsc::UnboundedReceiver<Job<T, C>>>>;

/// Submission side of a running worker pool.
///
/// Dropping the pool closes the queue; workers finish what is queued and exit.
pub(crate) struct WorkerPool<T, C> {
    queue: mpsc::UnboundedSender<Job<T, C>>,
}

impl<T, C> WorkerPool<T, C>
where
    T: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Spawns `size` workers into `set`, each holding its own clone of the
    /// result sender and the run's cancellation token.
    pub fn spawn(
        set: &mut JoinSet<()>,
        size: usize,
        shared: Arc<C>,
        sender: &ResultSender<T>,
        cancel: &CancellationToken,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let rx: JobQueue<T, C> = Arc::new(Mutex::new(rx));

        for worker_id in 0..size {
            set.spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&shared),
                sender.clone(),
                cancel.clone(),
            ));
        }

        Self { queue }
    }

    /// Enqueues a job for the next free worker.
    pub fn submit(&self, job: Job<T, C>) {
        if let Err(_e) = self.queue.send(job) {
            // Only possible when every worker is gone, i.e. the run was
            // cancelled before dispatch finished. The job is abandoned.
            #[cfg(feature = "tracing")]
            tracing::debug!("Job {} not queued: pool already stopped", _e.0.index);
        }
    }
}
