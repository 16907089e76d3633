//! The immutable record produced by every DPA transaction, and the sum
//! type summarizing how it ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{DpaMessage, hex_dot_encode};

/// Outcome of one DPA transaction. Only `Ok` carries a response payload.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// The coordinator responded with an OK error code.
    Ok(DpaMessage),
    /// No response arrived within the transaction's timeout.
    Timeout,
    /// The channel itself failed (I/O, not-ready).
    TransportError {
        /// Implementation-defined error code.
        code: i32,
        /// Human-readable description.
        message: String,
    },
    /// The coordinator responded with a non-OK DPA error code.
    DpaError {
        /// The DPA error code reported by the coordinator.
        code: i32,
        /// Human-readable description.
        message: String,
    },
    /// The transaction was cancelled before completion (e.g. a reset was
    /// observed mid-flight).
    Aborted,
}

impl TransactionOutcome {
    /// True if this outcome carries a usable response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, TransactionOutcome::Ok(_))
    }

    /// The numeric error code for this outcome, `0` for `Ok`.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            TransactionOutcome::Ok(_) => 0,
            TransactionOutcome::Timeout => -1,
            TransactionOutcome::TransportError { code, .. }
            | TransactionOutcome::DpaError { code, .. } => *code,
            TransactionOutcome::Aborted => -2,
        }
    }

    /// A human-readable description of this outcome.
    #[must_use]
    pub fn error_string(&self) -> String {
        match self {
            TransactionOutcome::Ok(_) => String::new(),
            TransactionOutcome::Timeout => "transaction timed out".to_string(),
            TransactionOutcome::TransportError { message, .. }
            | TransactionOutcome::DpaError { message, .. } => message.clone(),
            TransactionOutcome::Aborted => "transaction aborted".to_string(),
        }
    }
}

/// Immutable record of one request/confirmation/response cycle. The engine
/// produces it, a service consumes it, and the verbose response builder
/// serializes it into `data.raw[]`.
#[derive(Debug, Clone)]
pub struct DpaTransactionRecord {
    /// The bytes that were sent.
    pub request: DpaMessage,
    /// When the request was sent.
    pub request_ts: DateTime<Utc>,
    /// The confirmation frame, if one arrived (non-broadcast,
    /// non-coordinator addressees only).
    pub confirmation: Option<DpaMessage>,
    /// When the confirmation arrived.
    pub confirmation_ts: Option<DateTime<Utc>>,
    /// The response frame, if the transaction completed.
    pub response: Option<DpaMessage>,
    /// When the response arrived.
    pub response_ts: Option<DateTime<Utc>>,
    /// How the transaction ended.
    pub outcome: TransactionOutcome,
}

impl DpaTransactionRecord {
    /// True if the transaction produced a usable response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Renders this record as the verbose `data.raw[]` entry shape.
    #[must_use]
    pub fn to_raw_trace_entry(&self) -> RawTraceEntry {
        RawTraceEntry {
            request: hex_dot_encode(self.request.as_bytes()),
            request_ts: self.request_ts,
            confirmation: self.confirmation.as_ref().map(|m| hex_dot_encode(m.as_bytes())),
            confirmation_ts: self.confirmation_ts,
            response: self.response.as_ref().map(|m| hex_dot_encode(m.as_bytes())),
            response_ts: self.response_ts,
        }
    }
}

/// Verbose trace entry as embedded in `data.raw[]`. Bytes are two-digit
/// uppercase hex separated by `.`, timestamps are ISO-8601.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTraceEntry {
    /// Request bytes, hex-dot encoded.
    pub request: String,
    /// When the request was sent.
    #[serde(rename = "requestTs")]
    pub request_ts: DateTime<Utc>,
    /// Confirmation bytes, hex-dot encoded, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
    /// When the confirmation arrived, if any.
    #[serde(rename = "confirmationTs", skip_serializing_if = "Option::is_none")]
    pub confirmation_ts: Option<DateTime<Utc>>,
    /// Response bytes, hex-dot encoded, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// When the response arrived, if any.
    #[serde(rename = "responseTs", skip_serializing_if = "Option::is_none")]
    pub response_ts: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_record_has_no_response_but_nonzero_error() {
        let record = DpaTransactionRecord {
            request: DpaMessage::new(vec![0, 0, 0, 0]),
            request_ts: Utc::now(),
            confirmation: None,
            confirmation_ts: None,
            response: None,
            response_ts: None,
            outcome: TransactionOutcome::Timeout,
        };
        assert!(!record.is_ok());
        assert_ne!(record.outcome.error_code(), 0);
        let trace = record.to_raw_trace_entry();
        assert!(trace.response.is_none());
    }
}
