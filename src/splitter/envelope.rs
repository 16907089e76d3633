//! Free functions for picking fields out of the loosely-typed JSON
//! envelope without committing to a single Rust struct for it — requests
//! and responses have different shapes per `mType`, so only the handful
//! of fields every message shares are worth a helper.

use serde_json::Value;

use crate::domain_types::MsgId;

/// `data.msgId`, defaulting to `"unknown"` when absent or not a string.
#[must_use]
pub fn extract_msg_id(value: &Value) -> MsgId {
    value
        .get("data")
        .and_then(|d| d.get("msgId"))
        .and_then(Value::as_str)
        .and_then(|s| MsgId::try_new(s).ok())
        .unwrap_or_else(MsgId::unknown)
}

/// The top-level `mType` tag, if present and a string.
#[must_use]
pub fn extract_mtype(value: &Value) -> Option<&str> {
    value.get("mType").and_then(Value::as_str)
}

/// The top-level `ver` field, if present and a string.
#[must_use]
pub fn extract_version(value: &Value) -> Option<&str> {
    value.get("ver").and_then(Value::as_str)
}

/// `data.timeout`, in milliseconds, if present.
#[must_use]
pub fn extract_timeout_ms(value: &Value) -> Option<u32> {
    value
        .get("data")
        .and_then(|d| d.get("timeout"))
        .and_then(Value::as_u64)
        .map(|t| t as u32)
}

/// `data.returnVerbose`, defaulting to `false`.
#[must_use]
pub fn extract_return_verbose(value: &Value) -> bool {
    value
        .get("data")
        .and_then(|d| d.get("returnVerbose"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// `data.req`, the typed request payload every service parses.
#[must_use]
pub fn extract_request_payload(value: &Value) -> Value {
    value
        .get("data")
        .and_then(|d| d.get("req"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// True for the two-member handshake frame a websocket transport's
/// client library sends before any real `mType` message: exactly
/// `{"type":"auth","token":"..."}`. These carry no `mType` and must be
/// dropped silently rather than answered with `messageError`.
#[must_use]
pub fn is_auth_frame(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => {
            map.len() == 2
                && map.get("type").and_then(Value::as_str) == Some("auth")
                && map.get("token").is_some_and(Value::is_string)
        }
        None => false,
    }
}

/// Stamps `data.insId`, creating `data` if it doesn't exist yet.
pub fn stamp_ins_id(value: &mut Value, instance_id: &str) {
    if let Some(obj) = value.as_object_mut() {
        let data = obj.entry("data").or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(data_obj) = data.as_object_mut() {
            data_obj.insert("insId".to_string(), Value::String(instance_id.to_string()));
        }
    }
}

/// Strips a `"/"`-separated topic suffix from a target instance name,
/// e.g. transports that address subtopics (`"mqtt1/requests"`) but are
/// attached under just `"mqtt1"`.
#[must_use]
pub fn strip_topic_suffix(target: &str) -> &str {
    target.split('/').next().unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn msg_id_defaults_to_unknown() {
        let value = json!({"mType": "x", "data": {}});
        assert_eq!(extract_msg_id(&value).to_string(), "unknown");
    }

    #[test]
    fn msg_id_extracted_when_present() {
        let value = json!({"mType": "x", "data": {"msgId": "abc"}});
        assert_eq!(extract_msg_id(&value).to_string(), "abc");
    }

    #[test]
    fn auth_handshake_frame_is_recognized() {
        let value = json!({"type": "auth", "token": "abc123"});
        assert!(is_auth_frame(&value));
    }

    #[test]
    fn two_member_object_with_mtype_is_not_auth_frame() {
        let value = json!({"mType": "x", "data": {}});
        assert!(!is_auth_frame(&value));
    }

    #[test]
    fn two_member_object_without_auth_type_is_not_auth_frame() {
        let value = json!({"ver": "1.0", "data": {}});
        assert!(!is_auth_frame(&value));
    }

    #[test]
    fn auth_type_with_non_string_token_is_not_auth_frame() {
        let value = json!({"type": "auth", "token": 123});
        assert!(!is_auth_frame(&value));
    }

    #[test]
    fn topic_suffix_is_stripped() {
        assert_eq!(strip_topic_suffix("mqtt1/gateway/requests"), "mqtt1");
        assert_eq!(strip_topic_suffix("mqtt1"), "mqtt1");
    }

    #[test]
    fn stamp_ins_id_creates_data_object() {
        let mut value = json!({"mType": "x"});
        stamp_ins_id(&mut value, "gw1");
        assert_eq!(value["data"]["insId"], "gw1");
    }
}
