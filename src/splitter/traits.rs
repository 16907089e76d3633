//! Splitter-facing contracts: transports plug in, services register
//! handlers.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain_types::MessagingInstance;

/// Errors the splitter reports for attach/detach/send operations, as
/// distinct from the `messageError` replies it sends over a transport.
#[derive(Debug, Error)]
pub enum SplitterError {
    /// `attach_messaging` was called with an instance name already in use.
    #[error("messaging instance {0} is already attached")]
    DuplicateInstance(MessagingInstance),

    /// A send targeted an instance name with no attached transport.
    #[error("no transport attached for instance {0}")]
    UnknownInstance(String),

    /// A transport's `send_message` failed.
    #[error("transport {0} failed to send: {1}")]
    Transport(MessagingInstance, String),
}

/// An inbound/outbound byte pipe the splitter can attach. Transports
/// never hold a reference back to the splitter; they are handed bytes to
/// deliver and nothing else.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The `(transport-type, instance-name)` this transport is known by.
    fn instance(&self) -> MessagingInstance;

    /// Whether this transport should receive splitter broadcasts (sends
    /// with no explicit target list).
    fn accepts_async(&self) -> bool;

    /// Delivers a serialized JSON document to whatever is on the other
    /// end of this transport.
    async fn send_message(&self, bytes: Vec<u8>) -> Result<(), SplitterError>;
}

/// A registered handler for one or more `mType` prefixes. Receives the
/// full envelope (already schema-validated) and returns the full
/// response envelope; the splitter does not interpret the contents of
/// either beyond the fields documented in [`super::envelope`].
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Handles one validated, queued request and returns its response
    /// envelope.
    async fn handle(&self, request: Value) -> Value;
}
