//! A bounded FIFO paired with exactly one worker, matching the
//! management/network queue pair the splitter owns.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::domain_types::MessagingInstance;

/// One item of queued work: the raw document text plus where to reply.
pub struct QueueItem {
    /// The original JSON text, re-parsed by the worker.
    pub raw: String,
    /// Where to send the eventual response, if the source transport is
    /// still known.
    pub source: Option<MessagingInstance>,
}

/// Outcome of attempting to enqueue work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue has been paused or shut down.
    Inactive,
    /// The queue is at capacity.
    Full,
}

/// A bounded channel plus the active/paused flag the network queue needs
/// for `mngDaemon_StartNetworkQueue`/`StopNetworkQueue`.
pub struct Queue {
    tx: mpsc::Sender<QueueItem>,
    active: AtomicBool,
    capacity: usize,
}

impl Queue {
    /// Builds a queue of the given capacity plus its receiving half,
    /// which the caller hands to a worker task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueueItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, active: AtomicBool::new(true), capacity }, rx)
    }

    /// The configured capacity, echoed back in `messageError` replies.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pauses the queue: further `try_enqueue` calls fail with
    /// [`EnqueueError::Inactive`] until [`Queue::set_active`] re-enables
    /// it.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Whether the queue currently accepts new work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Non-blocking enqueue; never waits for room.
    pub fn try_enqueue(&self, item: QueueItem) -> Result<(), EnqueueError> {
        if !self.is_active() {
            return Err(EnqueueError::Inactive);
        }
        self.tx.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Inactive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_fails_when_paused() {
        let (queue, _rx) = Queue::new(4);
        queue.set_active(false);
        let err = queue.try_enqueue(QueueItem { raw: "{}".to_string(), source: None }).unwrap_err();
        assert_eq!(err, EnqueueError::Inactive);
    }

    #[test]
    fn enqueue_fails_when_full() {
        let (queue, _rx) = Queue::new(1);
        queue.try_enqueue(QueueItem { raw: "{}".to_string(), source: None }).unwrap();
        let err = queue.try_enqueue(QueueItem { raw: "{}".to_string(), source: None }).unwrap_err();
        assert_eq!(err, EnqueueError::Full);
    }
}
