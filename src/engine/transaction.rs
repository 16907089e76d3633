//! The per-transaction state machine and the bookkeeping the engine keeps
//! for the one transaction currently in flight.

use tokio::sync::oneshot;

use crate::dpa::DpaMessage;

/// Lifecycle of a single DPA transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Constructed but not yet handed to the channel.
    Created,
    /// Bytes handed to the channel successfully.
    Sent,
    /// A confirmation frame arrived (only applies to addressed,
    /// non-broadcast requests).
    Confirmed,
    /// A response frame arrived; the transaction is complete.
    Responded,
    /// Terminal: the transaction's full lifecycle finished normally.
    Done,
    /// Terminal: no response arrived before the timeout elapsed.
    TimedOut,
}

impl TransactionState {
    /// True for `Done` and `TimedOut`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Done | TransactionState::TimedOut)
    }
}

/// What the engine's frame router does with each inbound frame while a
/// transaction is pending: route it to the waiter via these senders.
pub struct PendingTransaction {
    pub(super) confirmation_tx: Option<oneshot::Sender<DpaMessage>>,
    pub(super) response_tx: Option<oneshot::Sender<DpaMessage>>,
}

impl PendingTransaction {
    /// Builds the waiter/sender pair for one transaction.
    pub fn new() -> (Self, oneshot::Receiver<DpaMessage>, oneshot::Receiver<DpaMessage>) {
        let (confirmation_tx, confirmation_rx) = oneshot::channel();
        let (response_tx, response_rx) = oneshot::channel();
        (
            Self {
                confirmation_tx: Some(confirmation_tx),
                response_tx: Some(response_tx),
            },
            confirmation_rx,
            response_rx,
        )
    }

    /// Delivers a confirmation frame to the waiting transaction, if one
    /// hasn't already been delivered.
    pub fn deliver_confirmation(&mut self, frame: DpaMessage) {
        if let Some(tx) = self.confirmation_tx.take() {
            let _ = tx.send(frame);
        }
    }

    /// Delivers the terminal response frame to the waiting transaction.
    pub fn deliver_response(&mut self, frame: DpaMessage) {
        if let Some(tx) = self.response_tx.take() {
            let _ = tx.send(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_recognized() {
        assert!(TransactionState::Done.is_terminal());
        assert!(TransactionState::TimedOut.is_terminal());
        assert!(!TransactionState::Sent.is_terminal());
    }

    #[tokio::test]
    async fn response_delivered_once_reaches_waiter() {
        let (mut pending, _confirmation_rx, response_rx) = PendingTransaction::new();
        pending.deliver_response(DpaMessage::new(vec![0, 0, 0, 0, 0]));
        let frame = response_rx.await.unwrap();
        assert_eq!(frame.as_bytes(), &[0, 0, 0, 0, 0]);
    }
}
