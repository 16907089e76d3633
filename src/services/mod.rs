//! IQMESH service handlers: the `ServiceHandler` implementations
//! registered with the [`crate::splitter::MessageSplitter`] for each
//! supported `mType`.

mod bond_node_local;
mod common;
mod enumerate_device;
mod iqrf_raw;
mod smart_connect;

pub use bond_node_local::BondNodeLocalHandler;
pub use common::{DeviceCache, DeviceInfo, NullDeviceCache, ServiceError};
pub use enumerate_device::EnumerateDeviceHandler;
pub use iqrf_raw::{IqrfRawHandler, IqrfRawHdpHandler};
pub use smart_connect::SmartConnectHandler;
