//! The fixed closed set of `mType` prefixes routed to the management
//! queue, and the built-in handler for the three `mngDaemon_*` control
//! messages the splitter itself answers.

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::envelope::{extract_mtype, extract_msg_id};
use super::splitter_impl::Inner;
use super::traits::ServiceHandler;

const MANAGEMENT_PREFIXES: &[&str] =
    &["mngDaemon_", "mngScheduler_", "mngService_", "iqrfDb_", "iqrfSensorData_"];

const MANAGEMENT_EXACT: &[&str] = &["cfgDaemon_Component", "ntfDaemon_InvokeMonitor"];

/// True if `tag` belongs on the management queue rather than network.
#[must_use]
pub fn is_management_type(tag: &str) -> bool {
    MANAGEMENT_PREFIXES.iter().any(|prefix| tag.starts_with(prefix)) || MANAGEMENT_EXACT.contains(&tag)
}

pub(super) const START_NETWORK_QUEUE: &str = "mngDaemon_StartNetworkQueue";
pub(super) const STOP_NETWORK_QUEUE: &str = "mngDaemon_StopNetworkQueue";
pub(super) const EXIT: &str = "mngDaemon_Exit";

/// Answers the three daemon-lifecycle control messages. Registered
/// internally by [`super::MessageSplitter::new`]; not something a
/// service ever needs to implement itself.
pub(super) struct DaemonControlHandler {
    pub(super) inner: std::sync::Weak<Inner>,
}

#[async_trait]
impl ServiceHandler for DaemonControlHandler {
    async fn handle(&self, request: Value) -> Value {
        let msg_id = extract_msg_id(&request);
        let Some(inner) = self.inner.upgrade() else {
            return json!({"mType": "messageError", "data": {"msgId": msg_id.to_string(), "status": 1, "statusStr": "splitter is shutting down"}});
        };
        let tag = extract_mtype(&request).unwrap_or_default();
        match tag {
            START_NETWORK_QUEUE => {
                inner.network.set_active(true);
                ack(tag, &msg_id)
            }
            STOP_NETWORK_QUEUE => {
                inner.network.set_active(false);
                ack(tag, &msg_id)
            }
            EXIT => {
                inner.network.set_active(false);
                inner.exit_requested.store(true, Ordering::SeqCst);
                ack(tag, &msg_id)
            }
            _ => json!({"mType": "messageError", "data": {"msgId": msg_id.to_string(), "status": 1, "statusStr": "unhandled daemon control message"}}),
        }
    }
}

fn ack(tag: &str, msg_id: &crate::domain_types::MsgId) -> Value {
    json!({
        "mType": tag,
        "data": { "msgId": msg_id.to_string(), "rsp": {}, "status": 0, "statusStr": "ok" }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_prefixes_are_recognized() {
        assert!(is_management_type("mngDaemon_Exit"));
        assert!(is_management_type("iqrfDb_Enumerate"));
        assert!(is_management_type("cfgDaemon_Component"));
        assert!(!is_management_type("iqmeshNetwork_BondNodeLocal"));
    }
}
