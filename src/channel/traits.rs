//! The `DpaCoordinatorChannel` contract.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::dpa::DpaMessage;

/// Errors a channel implementation can report. Framing is opaque to this
/// crate, so these are transport-level failures only.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying link reported an I/O failure.
    #[error("channel I/O error: {0}")]
    Io(String),

    /// `send` was called while the link was not ready.
    #[error("channel is not ready")]
    NotReady,
}

/// Readiness of the underlying link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// The link is not usable yet.
    NotReady,
    /// The link can send and receive frames.
    Ready,
}

/// Callback invoked from the channel's internal reader task for every
/// received frame. Boxed to allow capturing state, matching the teacher's
/// `FilteredMessageHandlerFunc` style of keeping the handler set small,
/// stable, and dynamically dispatched.
pub type ReceiveHandler = Arc<dyn Fn(DpaMessage) + Send + Sync>;

/// Framed byte I/O with a single coordinator. The channel does not
/// interpret bytes; it is a dumb transport plus a capability flag the
/// engine uses to reject non-lease traffic while a lease is held.
#[async_trait]
pub trait DpaCoordinatorChannel: Send + Sync {
    /// Sends a frame; fails with [`ChannelError`] on I/O failure or if the
    /// link is not ready.
    async fn send(&self, bytes: DpaMessage) -> Result<(), ChannelError>;

    /// Installs a handler invoked for every received frame. Replaces any
    /// previously registered handler.
    fn register_receive(&self, handler: ReceiveHandler);

    /// Removes the receive handler; further inbound frames are dropped.
    fn unregister_receive(&self);

    /// Sets the exclusive-send capability flag.
    fn set_exclusive(&self, exclusive: bool);

    /// Reads the exclusive-send capability flag.
    fn has_exclusive(&self) -> bool;

    /// Current readiness of the underlying link.
    fn state(&self) -> ChannelState;
}
