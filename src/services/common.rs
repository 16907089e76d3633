//! Request-building constants and the response/error shapes every IQMESH
//! service shares.

use serde_json::{Value, json};
use thiserror::Error;

use crate::dpa::{DpaMessage, DpaTransactionRecord};
use crate::domain_types::MsgId;
use crate::engine::EngineError;

/// IQRF DPA peripheral numbers and command codes the services issue.
/// These are the published DPA framework opcodes (the retrieval pack's
/// `original_source` links against a vendor header that defines them but
/// doesn't ship it), kept consistent with the `0x00`/`0x02` PNUM values
/// the engine's own startup sequence already uses for reset and OS read.
pub mod dpa_const {
    /// Coordinator peripheral.
    pub const PNUM_COORDINATOR: u8 = 0x00;
    /// OS peripheral.
    pub const PNUM_OS: u8 = 0x02;
    /// Pseudo-peripheral used for the "get peripheral info" enumeration
    /// request, addressed to the node being queried rather than the
    /// coordinator.
    pub const PNUM_ENUMERATION: u8 = 0xFF;

    /// `CMD_COORDINATOR_BONDED_DEVICES`: returns the 30-byte bonded bitmap.
    pub const CMD_COORDINATOR_BONDED_DEVICES: u8 = 0x02;
    /// `CMD_COORDINATOR_BOND_NODE`.
    pub const CMD_COORDINATOR_BOND_NODE: u8 = 0x04;
    /// `CMD_COORDINATOR_DISCOVERY_DATA`: reads coordinator's cached
    /// per-node discovery fields (VRN/zone/parent).
    pub const CMD_COORDINATOR_DISCOVERY_DATA: u8 = 0x0B;
    /// `CMD_COORDINATOR_SMART_CONNECT`.
    pub const CMD_COORDINATOR_SMART_CONNECT: u8 = 0x12;

    /// `CMD_OS_READ`.
    pub const CMD_OS_READ: u8 = 0x00;
    /// `CMD_OS_READ_CFG`: returns the 31-byte HWP configuration block.
    pub const CMD_OS_READ_CFG: u8 = 0x05;

    /// `CMD_GET_PER_INFO`.
    pub const CMD_GET_PER_INFO: u8 = 0x00;

    /// Sentinel HWPID meaning "don't validate the peripheral type".
    pub const HWPID_DO_NOT_CHECK: u16 = 0xFFFF;
}

/// Builds a 6-byte-header DPA request frame: 2-byte NADR (address always
/// fits in the low byte for this crate's purposes), PNUM, PCMD, 2-byte
/// HWPID, then peripheral-specific data.
#[must_use]
pub fn build_request(nadr: u8, pnum: u8, pcmd: u8, hwpid: u16, data: &[u8]) -> DpaMessage {
    let mut bytes = vec![nadr, 0x00, pnum, pcmd, (hwpid & 0xFF) as u8, (hwpid >> 8) as u8];
    bytes.extend_from_slice(data);
    DpaMessage::new(bytes)
}

/// The common error taxonomy every IQMESH service response status maps
/// back onto.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unclassified failure.
    #[error("{0}")]
    Generic(String),
    /// The request payload was missing required fields or malformed.
    #[error("failed to parse request: {0}")]
    RequestParse(String),
    /// `deviceAddr` already has a bit set in the bonded bitmap.
    #[error("Requested address is already assigned to another device.")]
    AddressAlreadyBonded,
    /// No free address remained for `deviceAddr == 0`.
    #[error("No available address to assign to a new node found.")]
    NoFreeAddress,
    /// A DPA transaction within the sequence failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ServiceError {
    /// The numeric `status` this error maps to in a `messageError`-shaped
    /// response (see spec §4.6).
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            ServiceError::Generic(_) => 1000,
            ServiceError::RequestParse(_) => 1001,
            ServiceError::Engine(EngineError::ExclusiveAccessBusy | EngineError::NotReady) => 1002,
            ServiceError::AddressAlreadyBonded => 1003,
            ServiceError::NoFreeAddress => 1004,
            ServiceError::Engine(_) => 1000,
        }
    }
}

/// External product-metadata lookup (manufacturer/product/standards)
/// keyed by the quadruple a device's OS-read/enumeration reveals. A
/// service consults it once bonding/enumeration succeeds; a miss is not
/// an error, it just leaves the fields blank.
pub trait DeviceCache: Send + Sync {
    /// Looks up human-readable metadata for a device identity.
    fn lookup(&self, hwpid: u16, hwpid_ver: u16, os_build: u16, dpa_ver: &str) -> Option<DeviceInfo>;
}

/// Manufacturer/product/standards metadata resolved from the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Manufacturer name.
    pub manufacturer: String,
    /// Product name.
    pub product: String,
    /// Supported IQRF standards.
    pub standards: Vec<String>,
}

/// A [`DeviceCache`] that never has an answer; the default when no cache
/// collaborator is wired up.
pub struct NullDeviceCache;

impl DeviceCache for NullDeviceCache {
    fn lookup(&self, _hwpid: u16, _hwpid_ver: u16, _os_build: u16, _dpa_ver: &str) -> Option<DeviceInfo> {
        None
    }
}

/// Builds the envelope every IQMESH service returns: `rsp` plus status,
/// and `raw[]` when the request asked for verbose output.
#[must_use]
pub fn build_response(
    tag: &str,
    msg_id: &MsgId,
    status: i32,
    status_str: &str,
    rsp: Value,
    verbose: bool,
    records: &[DpaTransactionRecord],
) -> Value {
    let mut data = json!({
        "msgId": msg_id.to_string(),
        "rsp": rsp,
        "status": status,
        "statusStr": status_str,
    });
    if verbose {
        let raw: Vec<_> = records.iter().map(DpaTransactionRecord::to_raw_trace_entry).collect();
        if let Ok(raw) = serde_json::to_value(raw) {
            data["raw"] = raw;
        }
    }
    json!({"mType": tag, "data": data})
}
