//! The router: owns the two queues, the schema registry, the transport
//! set and the handler map, and implements the inbound/outbound
//! algorithms.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

use crate::domain_types::{MessageType, MessagingInstance};
use crate::schema::SchemaRegistry;

use super::config::SplitterConfig;
use super::envelope;
use super::error_response;
use super::management::{self, DaemonControlHandler, EXIT, START_NETWORK_QUEUE, STOP_NETWORK_QUEUE};
use super::queue::{EnqueueError, Queue, QueueItem};
use super::traits::{ServiceHandler, SplitterError, Transport};

pub(super) struct Inner {
    config: SplitterConfig,
    schema: Arc<SchemaRegistry>,
    transports: DashMap<MessagingInstance, Arc<dyn Transport>>,
    handlers: RwLock<Vec<(String, Arc<dyn ServiceHandler>)>>,
    management: Queue,
    pub(super) network: Queue,
    pub(super) exit_requested: AtomicBool,
}

impl Inner {
    fn find_handler(&self, tag: &str) -> Option<Arc<dyn ServiceHandler>> {
        let handlers = self.handlers.read().expect("handlers lock poisoned");
        let mut best: Option<(usize, Arc<dyn ServiceHandler>)> = None;
        for (prefix, handler) in handlers.iter() {
            if !tag.starts_with(prefix.as_str()) {
                continue;
            }
            match &best {
                Some((best_len, _)) if *best_len >= prefix.len() => {}
                _ => best = Some((prefix.len(), handler.clone())),
            }
        }
        best.map(|(_, handler)| handler)
    }

    fn find_transport(&self, instance_name: &str) -> Option<Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|entry| entry.key().instance_name.to_string() == instance_name)
            .map(|entry| entry.value().clone())
    }

    async fn dispatch_outbound(&self, targets: &[String], mut doc: Value) {
        envelope::stamp_ins_id(&mut doc, &self.config.instance_id);

        if self.config.validate_responses {
            if let Some(tag) = envelope::extract_mtype(&doc) {
                let version = envelope::extract_version(&doc);
                let mtype = MessageType::parse(tag, version);
                if self.schema.knows_tag(&mtype.tag) {
                    let rsp = doc.get("data").and_then(|d| d.get("rsp")).cloned().unwrap_or(Value::Null);
                    if let Err(err) = self.schema.validate_response(&mtype, &rsp) {
                        warn!(%err, "outbound response failed schema validation");
                    }
                }
            }
        }

        let Ok(bytes) = serde_json::to_vec(&doc) else {
            warn!("failed to serialize outbound document");
            return;
        };

        if targets.is_empty() {
            let transports: Vec<Arc<dyn Transport>> =
                self.transports.iter().map(|entry| entry.value().clone()).collect();
            for transport in transports {
                if transport.accepts_async() {
                    if let Err(err) = transport.send_message(bytes.clone()).await {
                        warn!(%err, "broadcast send failed");
                    }
                }
            }
            return;
        }

        for target in targets {
            let key = envelope::strip_topic_suffix(target);
            match self.find_transport(key) {
                Some(transport) => {
                    if let Err(err) = transport.send_message(bytes.clone()).await {
                        warn!(%err, target = %target, "send failed");
                    }
                }
                None => warn!(target = %target, "no transport attached for outbound target"),
            }
        }
    }

    async fn incoming(self: &Arc<Self>, raw: &str, source: Option<MessagingInstance>) {
        let targets = reply_targets(&source);

        let parsed: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(err) => {
                let offset = err.column();
                self.dispatch_outbound(&targets, error_response::json_parse("unknown", err.to_string(), offset)).await;
                return;
            }
        };

        let msg_id = envelope::extract_msg_id(&parsed).to_string();

        if envelope::is_auth_frame(&parsed) {
            return;
        }

        let Some(tag) = envelope::extract_mtype(&parsed) else {
            self.dispatch_outbound(&targets, error_response::missing_message_type(&msg_id, raw)).await;
            return;
        };

        let mtype = MessageType::parse(tag, envelope::extract_version(&parsed));
        let is_management = management::is_management_type(&mtype.tag);

        // Daemon control messages (`mngDaemon_*` and friends) are built
        // into the splitter itself, not declared by on-disk schemas.
        if !is_management {
            if !self.schema.knows_tag(&mtype.tag) {
                self.dispatch_outbound(&targets, error_response::general(&msg_id, raw)).await;
                return;
            }

            let payload = envelope::extract_request_payload(&parsed);
            if let Err(err) = self.schema.validate_request(&mtype, &payload) {
                self.dispatch_outbound(&targets, error_response::validation(&msg_id, err.to_string())).await;
                return;
            }
        }

        let queue = if is_management { &self.management } else { &self.network };
        let item = QueueItem { raw: raw.to_string(), source };

        match queue.try_enqueue(item) {
            Ok(()) => {}
            Err(EnqueueError::Inactive) => {
                let reply = if is_management {
                    error_response::management_queue_inactive(&msg_id)
                } else {
                    error_response::network_queue_inactive(&msg_id)
                };
                self.dispatch_outbound(&targets, reply).await;
            }
            Err(EnqueueError::Full) => {
                let reply = if is_management {
                    error_response::management_queue_full(&msg_id, queue.capacity())
                } else {
                    error_response::network_queue_full(&msg_id, queue.capacity())
                };
                self.dispatch_outbound(&targets, reply).await;
            }
        }
    }

    async fn process_item(self: &Arc<Self>, item: QueueItem) {
        let QueueItem { raw, source } = item;
        let targets = reply_targets(&source);

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "queued item failed to re-parse");
                self.dispatch_outbound(&targets, error_response::general("unknown", err.to_string())).await;
                return;
            }
        };

        let tag = envelope::extract_mtype(&parsed).unwrap_or_default().to_string();
        let msg_id = envelope::extract_msg_id(&parsed).to_string();

        // `mngDaemon_Exit` stopping the network queue is handled by
        // `DaemonControlHandler` itself, invoked below like any other
        // registered handler, before it returns its ack response.
        let response = match self.find_handler(&tag) {
            Some(handler) => handler.handle(parsed).await,
            None => error_response::general(&msg_id, format!("Unsupported message type: {tag}")),
        };

        self.dispatch_outbound(&targets, response).await;
    }
}

fn reply_targets(source: &Option<MessagingInstance>) -> Vec<String> {
    source.as_ref().map(|instance| vec![instance.instance_name.to_string()]).unwrap_or_default()
}

/// The central router. Cheap to clone: internally an `Arc`.
#[derive(Clone)]
pub struct MessageSplitter {
    inner: Arc<Inner>,
}

impl MessageSplitter {
    /// Builds a splitter and spawns its two queue-worker tasks.
    #[must_use]
    pub fn new(config: SplitterConfig, schema: Arc<SchemaRegistry>) -> Self {
        let (management, management_rx) = Queue::new(config.management_queue_capacity);
        let (network, network_rx) = Queue::new(config.network_queue_capacity);

        let inner = Arc::new(Inner {
            config,
            schema,
            transports: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
            management,
            network,
            exit_requested: AtomicBool::new(false),
        });

        spawn_worker(inner.clone(), management_rx);
        spawn_worker(inner.clone(), network_rx);

        let splitter = Self { inner };
        splitter.register_daemon_control();
        splitter
    }

    fn register_daemon_control(&self) {
        let handler: Arc<dyn ServiceHandler> =
            Arc::new(DaemonControlHandler { inner: Arc::downgrade(&self.inner) });
        self.register_filtered_handler(
            &[START_NETWORK_QUEUE.to_string(), STOP_NETWORK_QUEUE.to_string(), EXIT.to_string()],
            handler,
        );
    }

    /// Registers an inbound/outbound transport. Fails if its instance is
    /// already attached.
    pub fn attach_messaging(&self, transport: Arc<dyn Transport>) -> Result<(), SplitterError> {
        let instance = transport.instance();
        if self.inner.transports.contains_key(&instance) {
            return Err(SplitterError::DuplicateInstance(instance));
        }
        self.inner.transports.insert(instance, transport);
        Ok(())
    }

    /// Detaches a previously attached transport; a no-op if it wasn't
    /// attached.
    pub fn detach_messaging(&self, instance: &MessagingInstance) {
        self.inner.transports.remove(instance);
    }

    /// Registers `handler` for every prefix in `prefixes`.
    pub fn register_filtered_handler(&self, prefixes: &[String], handler: Arc<dyn ServiceHandler>) {
        let mut handlers = self.inner.handlers.write().expect("handlers lock poisoned");
        for prefix in prefixes {
            handlers.push((prefix.clone(), handler.clone()));
        }
    }

    /// Removes every registration for the given prefixes.
    pub fn unregister_filtered_handler(&self, prefixes: &[String]) {
        let mut handlers = self.inner.handlers.write().expect("handlers lock poisoned");
        handlers.retain(|(prefix, _)| !prefixes.contains(prefix));
    }

    /// Runs the inbound algorithm for one raw JSON document.
    pub async fn incoming(&self, raw: &str, source: Option<MessagingInstance>) {
        self.inner.incoming(raw, source).await;
    }

    /// Runs the outbound algorithm directly, bypassing the queues —
    /// used by services to deliver a response they've already built.
    pub async fn send(&self, targets: &[String], doc: Value) {
        self.inner.dispatch_outbound(targets, doc).await;
    }

    /// True once `mngDaemon_Exit` has been processed.
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.inner.exit_requested.load(Ordering::SeqCst)
    }
}

fn spawn_worker(inner: Arc<Inner>, mut rx: tokio::sync::mpsc::Receiver<QueueItem>) {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            inner.process_item(item).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct RecordingTransport {
        instance: MessagingInstance,
        accepts_async: bool,
        received: StdMutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn instance(&self) -> MessagingInstance {
            self.instance.clone()
        }
        fn accepts_async(&self) -> bool {
            self.accepts_async
        }
        async fn send_message(&self, bytes: Vec<u8>) -> Result<(), SplitterError> {
            self.received.lock().unwrap().push(bytes);
            Ok(())
        }
    }

    fn write_schema(dir: &std::path::Path, name: &str, schema: &str) {
        std::fs::write(dir.join(name), schema).unwrap();
    }

    fn test_splitter() -> (MessageSplitter, Arc<RecordingTransport>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        write_schema(dir.path(), "iqmeshNetwork_BondNodeLocal-request-1-0-0.json", r#"{"type":"object"}"#);
        write_schema(dir.path(), "iqmeshNetwork_BondNodeLocal-response-1-0-0.json", r#"{"type":"object"}"#);
        let schema = Arc::new(SchemaRegistry::load_dir(dir.path()).unwrap());
        let splitter = MessageSplitter::new(SplitterConfig::development(), schema);
        let transport = Arc::new(RecordingTransport {
            instance: MessagingInstance::new("test", "client1"),
            accepts_async: true,
            received: StdMutex::new(Vec::new()),
        });
        splitter.attach_messaging(transport.clone()).unwrap();
        (splitter, transport, dir)
    }

    #[tokio::test]
    async fn unknown_message_type_yields_general_error() {
        let (splitter, transport, _dir) = test_splitter();
        let source = transport.instance();
        splitter.incoming(r#"{"mType":"does_not_exist","data":{"msgId":"x"}}"#, Some(source)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let received = transport.received.lock().unwrap();
        let doc: Value = serde_json::from_slice(&received[0]).unwrap();
        assert_eq!(doc["mType"], "messageError");
        assert_eq!(doc["data"]["status"], 1);
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error() {
        let (splitter, transport, _dir) = test_splitter();
        let source = transport.instance();
        splitter.incoming("{not json", Some(source)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let received = transport.received.lock().unwrap();
        let doc: Value = serde_json::from_slice(&received[0]).unwrap();
        assert_eq!(doc["data"]["status"], 2);
    }

    #[tokio::test]
    async fn auth_frame_is_dropped_silently() {
        let (splitter, transport, _dir) = test_splitter();
        let source = transport.instance();
        splitter.incoming(r#"{"type":"auth","token":"abc123"}"#, Some(source)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(transport.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_member_frame_that_is_not_an_auth_handshake_gets_missing_mtype_error() {
        let (splitter, transport, _dir) = test_splitter();
        let source = transport.instance();
        splitter.incoming(r#"{"ver":"1.0","data":{}}"#, Some(source)).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let received = transport.received.lock().unwrap();
        let doc: Value = serde_json::from_slice(&received[0]).unwrap();
        assert_eq!(doc["data"]["status"], 3);
    }

    #[tokio::test]
    async fn network_queue_stop_then_request_is_rejected() {
        let (splitter, transport, _dir) = test_splitter();
        let source = transport.instance();
        splitter
            .incoming(r#"{"mType":"mngDaemon_StopNetworkQueue","data":{"msgId":"s"}}"#, Some(source.clone()))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        splitter
            .incoming(
                &json!({"mType":"iqmeshNetwork_BondNodeLocal","data":{"msgId":"b","req":{}}}).to_string(),
                Some(source),
            )
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let received = transport.received.lock().unwrap();
        let last: Value = serde_json::from_slice(received.last().unwrap()).unwrap();
        assert_eq!(last["data"]["status"], 7);
    }

    #[tokio::test]
    async fn longest_prefix_match_wins() {
        let (splitter, transport, _dir) = test_splitter();

        struct Handler(&'static str);
        #[async_trait]
        impl ServiceHandler for Handler {
            async fn handle(&self, request: Value) -> Value {
                json!({"mType": "iqmeshNetwork_BondNodeLocal", "data": {"msgId": request["data"]["msgId"], "rsp": {"matched": self.0}, "status": 0}})
            }
        }
        splitter.register_filtered_handler(&["iqmeshNetwork_".to_string()], Arc::new(Handler("short")));
        splitter.register_filtered_handler(
            &["iqmeshNetwork_BondNodeLocal".to_string()],
            Arc::new(Handler("long")),
        );

        let source = transport.instance();
        splitter
            .incoming(
                &json!({"mType":"iqmeshNetwork_BondNodeLocal","data":{"msgId":"m","req":{}}}).to_string(),
                Some(source),
            )
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let received = transport.received.lock().unwrap();
        let doc: Value = serde_json::from_slice(received.last().unwrap()).unwrap();
        assert_eq!(doc["data"]["rsp"]["matched"], "long");
    }
}
