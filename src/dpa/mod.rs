//! DPA wire primitives: opaque framed bytes, hex-dot encoding, and the
//! immutable transaction record produced by every engine call.

mod message;
mod record;

pub use message::{DpaMessage, hex_dot_decode, hex_dot_encode};
pub use record::{DpaTransactionRecord, RawTraceEntry, TransactionOutcome};
