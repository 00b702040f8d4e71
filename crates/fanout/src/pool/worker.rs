use super::manager::JobQueue;
use crate::{ResultSender, launcher::execute};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Worker task pulling jobs from the pool's shared queue.
///
/// Each job is run to completion through [`execute`] before the next one is
/// pulled, so a pool of `n` workers never has more than `n` tasks in flight.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker (used for logs/tracing).
/// - `queue`: Shared queue; the lock is held only while waiting for the next
///   job.
/// - `shared`: The runner's shared context, handed to every task.
/// - `sender`: This worker's clone of the result sender.
/// - `cancel`: The run's cancellation token.
///
/// The loop ends when the queue is closed and empty, or on cancellation.
#[allow(clippy::used_underscore_binding)]
pub(crate) async fn worker_loop<T, C>(
    _worker_id: usize,
    queue: JobQueue<T, C>,
    shared: Arc<C>,
    sender: ResultSender<T>,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    C: Send + Sync + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} received cancellation");
                break;
            }
            job = async { queue.lock().await.recv().await } => job,
        };

        let Some(job) = next else {
            break;
        };
        execute(job, Arc::clone(&shared), &sender, &cancel).await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}
