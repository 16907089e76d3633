//! An in-memory channel used for local smoke-testing and unit tests.
//!
//! It echoes nothing on its own; a test or demo drives it by calling
//! [`LoopbackChannel::inject`] to simulate an inbound frame, and inspects
//! [`LoopbackChannel::sent`] to see what the engine transmitted.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use crate::dpa::DpaMessage;

use super::traits::{ChannelError, ChannelState, DpaCoordinatorChannel, ReceiveHandler};

/// A channel backed by in-process state rather than real hardware.
pub struct LoopbackChannel {
    ready: AtomicBool,
    exclusive: AtomicBool,
    handler: Mutex<Option<ReceiveHandler>>,
    sent: Mutex<Vec<DpaMessage>>,
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackChannel {
    /// Builds a channel that is immediately `Ready`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            exclusive: AtomicBool::new(false),
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Marks the link as not ready, e.g. to simulate a disconnect.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Delivers a frame to the registered receive handler, as if it had
    /// arrived from the coordinator.
    pub fn inject(&self, frame: DpaMessage) {
        let handler = self.handler.lock().expect("handler mutex poisoned").clone();
        if let Some(handler) = handler {
            handler(frame);
        } else {
            trace!("loopback channel dropped inbound frame: no receive handler registered");
        }
    }

    /// All frames sent through this channel so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<DpaMessage> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

#[async_trait]
impl DpaCoordinatorChannel for LoopbackChannel {
    async fn send(&self, bytes: DpaMessage) -> Result<(), ChannelError> {
        if self.state() != ChannelState::Ready {
            return Err(ChannelError::NotReady);
        }
        self.sent.lock().expect("sent mutex poisoned").push(bytes);
        Ok(())
    }

    fn register_receive(&self, handler: ReceiveHandler) {
        *self.handler.lock().expect("handler mutex poisoned") = Some(handler);
    }

    fn unregister_receive(&self) {
        *self.handler.lock().expect("handler mutex poisoned") = None;
    }

    fn set_exclusive(&self, exclusive: bool) {
        self.exclusive.store(exclusive, Ordering::SeqCst);
    }

    fn has_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::SeqCst)
    }

    fn state(&self) -> ChannelState {
        if self.ready.load(Ordering::SeqCst) {
            ChannelState::Ready
        } else {
            ChannelState::NotReady
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn send_records_frame_when_ready() {
        let channel = LoopbackChannel::new();
        channel
            .send(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x00]))
            .await
            .unwrap();
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn send_fails_when_not_ready() {
        let channel = LoopbackChannel::new();
        channel.set_ready(false);
        let err = channel
            .send(DpaMessage::new(vec![0x00]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotReady));
    }

    #[test]
    fn inject_invokes_registered_handler() {
        let channel = LoopbackChannel::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        channel.register_receive(Arc::new(move |_frame| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        channel.inject(DpaMessage::new(vec![0x00]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        channel.unregister_receive();
        channel.inject(DpaMessage::new(vec![0x00]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
