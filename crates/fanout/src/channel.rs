//! Result channel connecting task executions (producers) to the collector
//! (sole consumer).
//!
//! The channel is a bounded Tokio [`mpsc`] queue. Delivery order is completion
//! order, and every result is observed by exactly one receiver.
//!
//! ## Capacity
//!
//! - `0`: rendezvous. A send does not complete until the receiver has pulled
//!   that result. Each result travels with a [`oneshot`] acknowledgement the
//!   receiver fires on pull.
//! - `K > 0`: a send waits only while `K` undelivered results are queued.
//!
//! Closing the receiver makes further sends fail immediately, and
//! [`ResultReceiver::drain`] discards whatever is queued without waiting, which
//! also releases any producer parked in a rendezvous send.

use crate::{Error, Result, TaskResult};
use tokio::sync::{mpsc, oneshot};

struct Envelope<T> {
    result: TaskResult<T>,
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    fn open(self) -> TaskResult<T> {
        if let Some(ack) = self.ack {
            // The producer may have been dropped mid-send; nothing to release.
            let _ = ack.send(());
        }
        self.result
    }
}

/// Creates a result channel with the given capacity (`0` for rendezvous).
pub fn result_channel<T>(capacity: usize) -> (ResultSender<T>, ResultReceiver<T>) {
    let rendezvous = capacity == 0;
    // A rendezvous channel still needs one slot to hand the envelope over; the
    // acknowledgement is what holds the producer until the pull.
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ResultSender { tx, rendezvous }, ResultReceiver { rx })
}

/// Producer half of a result channel. Cheap to clone, one per execution.
pub struct ResultSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    rendezvous: bool,
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rendezvous: self.rendezvous,
        }
    }
}

impl<T> ResultSender<T> {
    /// Delivers a result to the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the receiver was closed or dropped,
    /// or, for a rendezvous channel, if the result was discarded before being
    /// pulled.
    pub async fn send(&self, result: TaskResult<T>) -> Result<()> {
        if !self.rendezvous {
            return self
                .tx
                .send(Envelope { result, ack: None })
                .await
                .map_err(|_| closed());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                result,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| closed())?;

        ack_rx.await.map_err(|_| Error::ChannelError {
            context: "Result discarded before collection".to_string(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub const fn is_rendezvous(&self) -> bool {
        self.rendezvous
    }
}

/// Consumer half of a result channel.
pub struct ResultReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> ResultReceiver<T> {
    /// Pulls the next completed result.
    ///
    /// Returns `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<TaskResult<T>> {
        self.rx.recv().await.map(Envelope::open)
    }

    /// Refuses further sends. Queued results can still be pulled or drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Discards every queued result without waiting and returns how many were
    /// dropped.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        // Dropping the envelope drops its acknowledgement, which wakes a
        // rendezvous producer with an error instead of leaving it parked.
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

fn closed() -> Error {
    Error::ChannelError {
        context: "Result channel closed".to_string(),
    }
}
