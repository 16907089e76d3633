//! `gatewayd` — the IQRF mesh gateway daemon process.
//!
//! Wires a coordinator channel, the DPA transaction engine, the schema
//! registry and the message splitter together, registers the IQMESH
//! service handlers, and runs until `mngDaemon_Exit` is processed.
//!
//! The concrete coordinator channel (USB CDC/SPI/UART) and messaging
//! transports (MQTT/WebSocket) are deployment-specific and out of scope
//! for this crate; this entry point uses the in-process
//! [`gatewayd_core::channel::LoopbackChannel`] so the daemon is runnable
//! standalone for development and schema/service smoke-testing.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use gatewayd_core::channel::LoopbackChannel;
use gatewayd_core::config::GatewayConfig;
use gatewayd_core::engine::{DpaEngine, DpaEngineImpl};
use gatewayd_core::observability;
use gatewayd_core::schema::SchemaRegistry;
use gatewayd_core::services::{
    BondNodeLocalHandler, EnumerateDeviceHandler, IqrfRawHandler, IqrfRawHdpHandler, NullDeviceCache, SmartConnectHandler,
};
use gatewayd_core::splitter::MessageSplitter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::development();
    observability::init_tracing(&config);

    info!(schema_dir = %config.schema_dir.display(), "starting gatewayd");

    let schema = Arc::new(SchemaRegistry::load_dir(&config.schema_dir)?);

    let channel = Arc::new(LoopbackChannel::new());
    let engine = DpaEngineImpl::new(channel);
    engine.start().await?;

    let splitter = MessageSplitter::new(config.splitter.clone(), schema);

    let cache = Arc::new(NullDeviceCache);
    let engine_dyn: Arc<dyn DpaEngine> = engine;
    splitter.register_filtered_handler(
        &["iqmeshNetwork_BondNodeLocal".to_string()],
        Arc::new(BondNodeLocalHandler::new(engine_dyn.clone(), cache.clone())),
    );
    splitter.register_filtered_handler(
        &["iqmeshNetwork_SmartConnect".to_string()],
        Arc::new(SmartConnectHandler::new(engine_dyn.clone(), cache.clone())),
    );
    splitter.register_filtered_handler(
        &["iqmeshNetwork_EnumerateDevice".to_string()],
        Arc::new(EnumerateDeviceHandler::new(engine_dyn.clone(), cache)),
    );
    splitter.register_filtered_handler(&["iqrfRawHdp".to_string()], Arc::new(IqrfRawHdpHandler::new(engine_dyn.clone())));
    splitter.register_filtered_handler(&["iqrfRaw".to_string()], Arc::new(IqrfRawHandler::new(engine_dyn)));

    info!("gatewayd ready");

    while !splitter.exit_requested() {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    info!("gatewayd shutting down");
    Ok(())
}
