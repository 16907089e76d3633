//! Builders for the eight `messageError` shapes the splitter can emit.
//! Field names and status codes are a fixed external contract, not an
//! internal convention — do not renumber them.

use serde_json::{Value, json};

/// Malformed input, missing handler, or any other failure that doesn't
/// fit the other seven specific codes — including an `mType` with no
/// registered schema.
pub const GENERAL: i32 = 1;
/// The inbound text was not valid JSON.
pub const JSON_PARSE: i32 = 2;
/// The inbound document had no `mType` field.
pub const MISSING_MESSAGE_TYPE: i32 = 3;
/// The inbound document failed request-schema validation.
pub const VALIDATION: i32 = 4;
/// The management queue is not accepting work (never happens in normal
/// operation; reserved for a queue whose worker has stopped).
pub const MANAGEMENT_QUEUE_INACTIVE: i32 = 5;
/// The management queue was full.
pub const MANAGEMENT_QUEUE_FULL: i32 = 6;
/// The network queue has been paused via `mngDaemon_StopNetworkQueue`.
pub const NETWORK_QUEUE_INACTIVE: i32 = 7;
/// The network queue was full.
pub const NETWORK_QUEUE_FULL: i32 = 8;

fn envelope(msg_id: &str, status: i32, status_str: &str, rsp: Value) -> Value {
    json!({
        "mType": "messageError",
        "data": {
            "msgId": msg_id,
            "status": status,
            "statusStr": status_str,
            "rsp": rsp,
        }
    })
}

/// Code 1: an `mType` the schema registry has no schema for, or any
/// other failure not covered below. `message` carries context — for an
/// unsupported type, the original raw document text.
#[must_use]
pub fn general(msg_id: &str, message: impl Into<String>) -> Value {
    envelope(msg_id, GENERAL, "unsupported message type or general failure", json!({"message": message.into()}))
}

/// Code 2: the inbound text failed to parse as JSON.
#[must_use]
pub fn json_parse(msg_id: &str, message: impl Into<String>, offset: usize) -> Value {
    envelope(
        msg_id,
        JSON_PARSE,
        "invalid JSON",
        json!({"message": message.into(), "offset": offset}),
    )
}

/// Code 3: no `mType` field. `ignored_message` is the raw document text.
#[must_use]
pub fn missing_message_type(msg_id: &str, ignored_message: impl Into<String>) -> Value {
    envelope(
        msg_id,
        MISSING_MESSAGE_TYPE,
        "missing mType",
        json!({"ignoredMessage": ignored_message.into()}),
    )
}

/// Code 4: request-schema validation failed. `error` is the validator's
/// description, including the failing path.
#[must_use]
pub fn validation(msg_id: &str, error: impl Into<String>) -> Value {
    envelope(msg_id, VALIDATION, "schema validation failed", json!({"error": error.into()}))
}

/// Code 5.
#[must_use]
pub fn management_queue_inactive(msg_id: &str) -> Value {
    envelope(msg_id, MANAGEMENT_QUEUE_INACTIVE, "management queue is not active", json!({}))
}

/// Code 6. `capacity` is echoed back so the client can see what it's up
/// against.
#[must_use]
pub fn management_queue_full(msg_id: &str, capacity: usize) -> Value {
    envelope(msg_id, MANAGEMENT_QUEUE_FULL, "management queue is full", json!({"capacity": capacity}))
}

/// Code 7.
#[must_use]
pub fn network_queue_inactive(msg_id: &str) -> Value {
    envelope(msg_id, NETWORK_QUEUE_INACTIVE, "network queue is not active", json!({}))
}

/// Code 8.
#[must_use]
pub fn network_queue_full(msg_id: &str, capacity: usize) -> Value {
    envelope(msg_id, NETWORK_QUEUE_FULL, "network queue is full", json!({"capacity": capacity}))
}
