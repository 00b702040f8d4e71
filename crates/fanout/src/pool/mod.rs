//! Fixed-size worker pool used when a run has a concurrency limit.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`]: spawns workers and feeds the shared queue.
//! - [`worker`] - `worker_loop`: pulls jobs until the queue closes or the run
//!   is cancelled.

pub(crate) mod manager;
pub(crate) mod worker;

pub(crate) use manager::WorkerPool;
