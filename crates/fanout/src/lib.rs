#![doc = include_str!("../README.md")]

mod channel;
mod collector;
mod config;
mod error;
mod launcher;
mod pool;
mod report;
mod runner;
mod task;

pub use crate::channel::*;
pub use crate::collector::RunState;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::report::*;
pub use crate::runner::*;
pub use crate::task::*;
// Re-exported so callers can cancel runs without depending on `tokio-util`.
pub use tokio_util::sync::CancellationToken;
