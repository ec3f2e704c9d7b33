//! Single-producer, single-consumer bounded queue between pipeline workers.
//!
//! A thin typed wrapper over [`tokio::sync::mpsc`]. Neither half is
//! cloneable, so exactly one producer and one consumer exist per queue. Both
//! operations are non-blocking: a full queue hands the item back to the
//! caller, and an empty queue yields `None`.

use std::num::NonZeroUsize;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Failure to enqueue. The rejected item is returned so the caller can
/// dispose of it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError<T> {
    /// The queue is at capacity. This is backpressure, not a fault.
    #[error("queue full")]
    Full(T),
    /// The consumer half has been dropped.
    #[error("queue closed")]
    Closed(T),
}

impl<T> EnqueueError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// Producer half of a bounded queue.
#[derive(Debug)]
pub struct QueueTx<T> {
    tx: mpsc::Sender<T>,
}

/// Consumer half of a bounded queue.
#[derive(Debug)]
pub struct QueueRx<T> {
    rx: mpsc::Receiver<T>,
}

/// Create a queue holding at most `capacity` items.
#[must_use]
pub fn bounded<T>(capacity: NonZeroUsize) -> (QueueTx<T>, QueueRx<T>) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (QueueTx { tx }, QueueRx { rx })
}

impl<T> QueueTx<T> {
    /// Enqueue `item` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] when the queue is at capacity and
    /// [`EnqueueError::Closed`] when the consumer is gone.
    pub fn try_enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => EnqueueError::Full(item),
            TrySendError::Closed(item) => EnqueueError::Closed(item),
        })
    }

    /// Whether the consumer half has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

impl<T> QueueRx<T> {
    /// Dequeue the oldest item, or `None` if the queue is empty.
    pub fn try_dequeue(&mut self) -> Option<T> { self.rx.try_recv().ok() }

    /// Items currently queued.
    #[must_use]
    pub fn len(&self) -> usize { self.rx.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.rx.is_empty() }
}
