//! Black-box coverage of the concrete end-to-end scenarios: unknown
//! `mType`, schema violation, address-already-bonded, a full smart
//! connect, a full network queue, and a paused network queue.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::tempdir;

use proptest::prelude::*;

use gatewayd_core::channel::LoopbackChannel;
use gatewayd_core::domain_types::MessagingInstance;
use gatewayd_core::dpa::DpaMessage;
use gatewayd_core::engine::{DpaEngine, DpaEngineImpl};
use gatewayd_core::schema::SchemaRegistry;
use gatewayd_core::services::{BondNodeLocalHandler, NullDeviceCache, SmartConnectHandler};
use gatewayd_core::splitter::{MessageSplitter, ServiceHandler, SplitterConfig, SplitterError, Transport};

struct RecordingTransport {
    instance: MessagingInstance,
    received: StdMutex<Vec<Value>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    fn instance(&self) -> MessagingInstance {
        self.instance.clone()
    }
    fn accepts_async(&self) -> bool {
        true
    }
    async fn send_message(&self, bytes: Vec<u8>) -> Result<(), SplitterError> {
        self.received.lock().unwrap().push(serde_json::from_slice(&bytes).unwrap());
        Ok(())
    }
}

fn write_schema(dir: &std::path::Path, name: &str, schema: &str) {
    std::fs::write(dir.join(name), schema).unwrap();
}

fn test_splitter(capacity: usize) -> (MessageSplitter, Arc<RecordingTransport>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    write_schema(
        dir.path(),
        "iqmeshNetwork_BondNodeLocal-request-1-0-0.json",
        r#"{"type":"object","required":["req"],"properties":{"req":{"type":"object","required":["deviceAddr"]}}}"#,
    );
    write_schema(dir.path(), "iqmeshNetwork_BondNodeLocal-response-1-0-0.json", r#"{"type":"object"}"#);
    let schema = Arc::new(SchemaRegistry::load_dir(dir.path()).unwrap());
    let mut config = SplitterConfig::development();
    config.network_queue_capacity = capacity;
    config.management_queue_capacity = capacity;
    let splitter = MessageSplitter::new(config, schema);
    let transport = Arc::new(RecordingTransport { instance: MessagingInstance::new("test", "client1"), received: StdMutex::new(Vec::new()) });
    splitter.attach_messaging(transport.clone()).unwrap();
    (splitter, transport, dir)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn unknown_message_type_yields_general_error() {
    let (splitter, transport, _dir) = test_splitter(32);
    let source = transport.instance();
    let raw = r#"{"mType":"does_not_exist","data":{"msgId":"x"}}"#;
    splitter.incoming(raw, Some(source)).await;
    settle().await;

    let received = transport.received.lock().unwrap();
    let doc = received.last().unwrap();
    assert_eq!(doc["mType"], "messageError");
    assert_eq!(doc["data"]["status"], 1);
    assert_eq!(doc["data"]["rsp"]["message"], raw);
}

#[tokio::test]
async fn missing_req_fails_schema_validation() {
    let (splitter, transport, _dir) = test_splitter(32);
    let source = transport.instance();
    splitter.incoming(r#"{"mType":"iqmeshNetwork_BondNodeLocal","data":{"msgId":"x"}}"#, Some(source)).await;
    settle().await;

    let received = transport.received.lock().unwrap();
    let doc = received.last().unwrap();
    assert_eq!(doc["mType"], "messageError");
    assert_eq!(doc["data"]["status"], 4);
    assert!(doc["data"]["rsp"]["error"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn network_queue_full_rejects_the_overflow_request() {
    let (splitter, transport, _dir) = test_splitter(2);
    let source = transport.instance();

    // Two requests fill the queue (no handler is registered, so the
    // worker never drains it before the third arrives); the third finds
    // no room.
    for id in 0..3 {
        let raw = json!({
            "mType": "iqmeshNetwork_BondNodeLocal",
            "data": {"msgId": format!("m{id}"), "req": {"deviceAddr": 1}}
        })
        .to_string();
        splitter.incoming(&raw, Some(source.clone())).await;
    }
    settle().await;

    let received = transport.received.lock().unwrap();
    let full = received.iter().find(|doc| doc["data"]["status"] == 8).expect("one reply reports the queue full");
    assert_eq!(full["data"]["rsp"]["capacity"], 2);
}

#[tokio::test]
async fn stopped_network_queue_rejects_requests() {
    let (splitter, transport, _dir) = test_splitter(32);
    let source = transport.instance();

    splitter.incoming(r#"{"mType":"mngDaemon_StopNetworkQueue","data":{"msgId":"s"}}"#, Some(source.clone())).await;
    settle().await;

    let raw = json!({"mType": "iqmeshNetwork_BondNodeLocal", "data": {"msgId": "m", "req": {"deviceAddr": 1}}}).to_string();
    splitter.incoming(&raw, Some(source)).await;
    settle().await;

    let received = transport.received.lock().unwrap();
    let last = received.last().unwrap();
    assert_eq!(last["data"]["status"], 7);
}

/// Boots a real `DpaEngineImpl` over a `LoopbackChannel`, scripting the
/// reset notification and OS-read response the startup sequence needs.
async fn boot_engine() -> (Arc<DpaEngineImpl>, Arc<LoopbackChannel>) {
    let channel = Arc::new(LoopbackChannel::new());
    let engine = DpaEngineImpl::new(channel.clone());

    let engine_clone = engine.clone();
    let start_handle = tokio::spawn(async move { engine_clone.start().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    // reset notification: NADR/PNUM/PCMD all zero, HWPID unused, pdata
    // carries the DPA version word (major, minor).
    channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x04, 0x00]));

    tokio::time::sleep(Duration::from_millis(20)).await;
    channel.inject(DpaMessage::new(vec![
        0x00, 0x00, 0x02, 0x80, 0xFF, 0xFF, // NADR, PNUM, PCMD (response bit set), HWPID
        0x01, 0x02, 0x03, 0x04, // MID
        0x41, // os_version
        0x00, 0x81, // mcu_type
        0x34, 0x12, // os_build
    ]));

    start_handle.await.unwrap().unwrap();
    (engine, channel)
}

#[tokio::test]
async fn bond_at_used_address_reports_one_transaction_record() {
    let (engine, channel) = boot_engine().await;
    let engine_dyn: Arc<dyn DpaEngine> = engine;
    let handler = BondNodeLocalHandler::new(engine_dyn, Arc::new(NullDeviceCache));

    let handle = tokio::spawn({
        let request = json!({"mType":"iqmeshNetwork_BondNodeLocal","data":{"msgId":"b","returnVerbose":true,"req":{"deviceAddr":5}}});
        async move { handler.handle(request).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut bitmap = [0u8; 30];
    bitmap[0] = 0b0010_0000; // address 5 bonded
    let mut response = vec![0x00, 0x00, 0x00, 0x80, 0xFF, 0xFF];
    response.extend_from_slice(&bitmap);
    channel.inject(DpaMessage::new(response));

    let result = handle.await.unwrap();
    assert_eq!(result["data"]["status"], 1003);
    assert_eq!(result["data"]["rsp"], json!({}));
    assert_eq!(result["data"]["raw"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn smart_connect_happy_path_bonds_the_decoded_device() {
    let (engine, channel) = boot_engine().await;
    let engine_dyn: Arc<dyn DpaEngine> = engine;
    let handler = SmartConnectHandler::new(engine_dyn, Arc::new(NullDeviceCache));

    let decoded = gatewayd_core::iqrf_code::DecodedCode {
        mid: Some([0x01, 0x02, 0x03, 0x04]),
        ibk: Some([0xAA; 16]),
        hwpid: Some(0x1234),
    };
    let code = gatewayd_core::iqrf_code::encode(&decoded);

    let handle = tokio::spawn({
        let request = json!({
            "mType": "iqmeshNetwork_SmartConnect",
            "data": {"msgId": "s", "req": {"deviceAddr": 0, "smartConnectCode": code}}
        });
        async move { handler.handle(request).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    // bonded-devices bitmap: empty
    channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x80, 0xFF, 0xFF].into_iter().chain(std::iter::repeat(0u8).take(30)).collect()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    // smart connect response: BondAddr=1, DevNr=1
    channel.inject(DpaMessage::new(vec![0x00, 0x00, 0x00, 0x92, 0xFF, 0xFF, 0x01, 0x01]));

    tokio::time::sleep(Duration::from_millis(280)).await;
    // peripheral-enumerate response: hwpIdVer
    channel.inject(DpaMessage::new(vec![0x01, 0x00, 0xFF, 0x80, 0xFF, 0xFF, 0x01, 0x00]));

    tokio::time::sleep(Duration::from_millis(20)).await;
    // os-read response
    channel.inject(DpaMessage::new(vec![0x01, 0x00, 0x02, 0x80, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04, 0x41, 0x00, 0x81, 0x00, 0x00]));

    let result = handle.await.unwrap();
    assert_eq!(result["data"]["status"], 0);
    assert_eq!(result["data"]["rsp"]["assignedAddr"], 1);
    assert_eq!(result["data"]["rsp"]["nodesNr"], 1);
    assert_eq!(result["data"]["rsp"]["hwpId"], 0x1234);
}

proptest! {
    #[test]
    fn iqrf_code_decode_then_encode_reproduces_the_code(
        mid in proptest::option::of(proptest::array::uniform4(any::<u8>())),
        ibk in proptest::option::of(proptest::array::uniform16(any::<u8>())),
        hwpid in proptest::option::of(any::<u16>()),
    ) {
        let decoded = gatewayd_core::iqrf_code::DecodedCode { mid, ibk, hwpid };
        let code = gatewayd_core::iqrf_code::encode(&decoded);

        let redecoded = gatewayd_core::iqrf_code::decode(&code).unwrap();
        prop_assert_eq!(&redecoded, &decoded);
        prop_assert_eq!(gatewayd_core::iqrf_code::encode(&redecoded), code);
    }
}
