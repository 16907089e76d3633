//! `iqmeshNetwork_EnumerateDevice`: pull together everything known about
//! one already-bonded node — discovery data, OS info, peripheral
//! enumeration and TR configuration — into a single response.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain_types::MAX_ADDRESS;
use crate::engine::DpaEngine;
use crate::splitter::{ServiceHandler, envelope};

use super::common::{DeviceCache, ServiceError, build_request, build_response, dpa_const::*};

const TAG: &str = "iqmeshNetwork_EnumerateDevice";
const COORDINATOR_ADDRESS: u8 = 0;
const CONFIGURATION_LEN: usize = 31;
/// Offset of the response's `Undocumented[0]` byte: past the 31-byte
/// `Configuration` block plus the `Checksum` and `RFPGM` bytes.
const UNDOCUMENTED_OFFSET: usize = CONFIGURATION_LEN + 2;

#[derive(Debug)]
struct EnumerateParams {
    device_addr: u8,
}

fn parse_request(request: &Value) -> Result<EnumerateParams, ServiceError> {
    let req = request
        .get("data")
        .and_then(|d| d.get("req"))
        .ok_or_else(|| ServiceError::RequestParse("missing data.req".to_string()))?;

    let device_addr = req
        .get("deviceAddr")
        .and_then(Value::as_u64)
        .ok_or_else(|| ServiceError::RequestParse("missing deviceAddr".to_string()))?;
    if device_addr > u64::from(MAX_ADDRESS) {
        return Err(ServiceError::RequestParse(format!("deviceAddr {device_addr} out of range")));
    }

    Ok(EnumerateParams { device_addr: device_addr as u8 })
}

/// Registered for `iqmeshNetwork_EnumerateDevice`.
pub struct EnumerateDeviceHandler {
    engine: Arc<dyn DpaEngine>,
    cache: Arc<dyn DeviceCache>,
}

impl EnumerateDeviceHandler {
    /// Builds the handler over a shared engine and device cache.
    #[must_use]
    pub fn new(engine: Arc<dyn DpaEngine>, cache: Arc<dyn DeviceCache>) -> Self {
        Self { engine, cache }
    }
}

#[async_trait]
impl ServiceHandler for EnumerateDeviceHandler {
    async fn handle(&self, request: Value) -> Value {
        let msg_id = envelope::extract_msg_id(&request);
        let verbose = envelope::extract_return_verbose(&request);

        let params = match parse_request(&request) {
            Ok(params) => params,
            Err(err) => {
                return build_response(TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[]);
            }
        };

        let mut records = Vec::new();
        let lease = self.engine.clone().acquire_exclusive().await;
        let result = run(&lease, self.cache.as_ref(), &params, &mut records).await;
        drop(lease);

        match result {
            Ok(rsp) => build_response(TAG, &msg_id, 0, "ok", rsp, verbose, &records),
            Err(err) => build_response(TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &records),
        }
    }
}

/// Undocumented flag bits and derived fields pulled out of the 31-byte
/// `TPerOSReadCfg_Response` configuration block, with DPA-version gates
/// mirroring the reference coordinator's enumeration logic.
#[derive(Debug, Default, PartialEq, Eq)]
struct TrConfiguration {
    custom_dpa_handler: bool,
    dpa_peer_to_peer: Option<bool>,
    never_sleep: Option<bool>,
    std_and_lp_network: Option<bool>,
    local_frc_reception: Option<bool>,
    rf_band: String,
}

/// `undocumented_byte` is the first byte of the response's `Undocumented`
/// tail (immediately after the 31-byte `Configuration` block and the
/// `Checksum`/`RFPGM` bytes), not part of `raw_configuration` itself and
/// never XOR-masked.
fn decode_tr_configuration(
    raw_configuration: &[u8; CONFIGURATION_LEN],
    undocumented_byte: u8,
    dpa_ver: u16,
    is_coordinator: bool,
) -> TrConfiguration {
    let mut configuration = *raw_configuration;
    if dpa_ver < 0x0303 {
        for byte in &mut configuration {
            *byte ^= 0x34;
        }
    }

    let byte05 = configuration[0x04];
    let custom_dpa_handler = byte05 & 0b1 == 0b1;
    let dpa_peer_to_peer = (dpa_ver >= 0x0410).then(|| byte05 & 0b0000_0010 == 0b0000_0010);
    let never_sleep = (dpa_ver >= 0x0303).then(|| byte05 & 0b0100_0000 == 0b0100_0000);
    let std_and_lp_network = (dpa_ver >= 0x0400).then(|| byte05 & 0b1000_0000 == 0b1000_0000);
    let local_frc_reception =
        (dpa_ver >= 0x0415 && !is_coordinator).then(|| configuration[0x0c] & 0b1 == 0b1);

    let rf_band = match undocumented_byte & 0x03 {
        0b00 => "868",
        0b01 => "916",
        0b10 => "433",
        _ => "",
    }
    .to_string();

    TrConfiguration { custom_dpa_handler, dpa_peer_to_peer, never_sleep, std_and_lp_network, local_frc_reception, rf_band }
}

async fn run(
    lease: &crate::engine::ExclusiveLease,
    cache: &dyn DeviceCache,
    params: &EnumerateParams,
    records: &mut Vec<crate::dpa::DpaTransactionRecord>,
) -> Result<Value, ServiceError> {
    let is_coordinator = params.device_addr == COORDINATOR_ADDRESS;

    let discovery = if is_coordinator {
        None
    } else {
        let discovery_request =
            build_request(COORDINATOR_ADDRESS, PNUM_COORDINATOR, CMD_COORDINATOR_DISCOVERY_DATA, HWPID_DO_NOT_CHECK, &[params.device_addr]);
        let discovery_record = lease.execute(discovery_request).await?;
        let fields = discovery_record.response.as_ref().map(|r| r.pdata().get(..4).unwrap_or(&[0; 4]).to_vec());
        records.push(discovery_record);
        fields
    };

    let os_request = build_request(params.device_addr, PNUM_OS, CMD_OS_READ, HWPID_DO_NOT_CHECK, &[]);
    let os_record = lease.execute(os_request).await?;
    let hwpid_from_header = os_record.response.as_ref().and_then(crate::dpa::DpaMessage::hwpid).unwrap_or(0);
    let os_pdata = os_record.response.as_ref().map(|r| r.pdata().to_vec()).unwrap_or_default();
    let os_build = os_pdata.get(7..9).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    let dpa_ver_word = os_pdata.get(4..6).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    records.push(os_record);

    let enum_request = build_request(params.device_addr, PNUM_ENUMERATION, CMD_GET_PER_INFO, HWPID_DO_NOT_CHECK, &[]);
    let enum_record = lease.execute(enum_request).await?;
    let enum_pdata = enum_record.response.as_ref().map(|r| r.pdata().to_vec()).unwrap_or_default();
    let hwpid_ver = enum_pdata.get(..2).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    let per_flags = enum_pdata.get(2).copied().unwrap_or(0);
    records.push(enum_record);

    let cfg_request = build_request(params.device_addr, PNUM_OS, CMD_OS_READ_CFG, HWPID_DO_NOT_CHECK, &[]);
    let cfg_record = lease.execute(cfg_request).await?;
    let configuration: [u8; CONFIGURATION_LEN] = cfg_record
        .response
        .as_ref()
        .and_then(|r| r.pdata().get(..CONFIGURATION_LEN))
        .and_then(|b| <[u8; CONFIGURATION_LEN]>::try_from(b).ok())
        .unwrap_or([0; CONFIGURATION_LEN]);
    let undocumented_byte =
        cfg_record.response.as_ref().and_then(|r| r.pdata().get(UNDOCUMENTED_OFFSET)).copied().unwrap_or(0);
    records.push(cfg_record);

    let tr_configuration = decode_tr_configuration(&configuration, undocumented_byte, dpa_ver_word, is_coordinator);
    let info = cache.lookup(hwpid_from_header, hwpid_ver, os_build, "").unwrap_or_default();

    let mut rsp = json!({
        "discoveredDevices": discovery.as_ref().map(|f| f.first().copied().unwrap_or(0) & 0b1 == 0b1),
        "vrn": discovery.as_ref().and_then(|f| f.get(1).copied()),
        "zone": discovery.as_ref().and_then(|f| f.get(2).copied()),
        "parent": discovery.as_ref().and_then(|f| f.get(3).copied()),
        "osRead": {
            "osBuild": format!("{os_build:04X}"),
        },
        "peripheralEnumeration": {
            "hwpId": hwpid_from_header,
            "hwpIdVer": hwpid_ver,
            "flags": {
                "value": per_flags,
                "rfModeStd": per_flags & 0b1 == 0b1,
                "rfModeLp": per_flags & 0b1 != 0b1,
            },
        },
        "trConfiguration": {
            "customDpaHandler": tr_configuration.custom_dpa_handler,
            "dpaPeerToPeer": tr_configuration.dpa_peer_to_peer,
            "neverSleep": tr_configuration.never_sleep,
            "stdAndLpNetwork": tr_configuration.std_and_lp_network,
            "localFrcReception": tr_configuration.local_frc_reception,
            "rfBand": tr_configuration.rf_band,
        },
        "manufacturer": info.manufacturer,
        "product": info.product,
        "standards": info.standards,
    });
    if let Value::Object(ref mut map) = rsp {
        map.retain(|_, v| !v.is_null());
    }

    Ok(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_requires_device_addr() {
        let request = json!({"data": {"msgId": "x", "req": {}}});
        let err = parse_request(&request).unwrap_err();
        assert_eq!(err.status_code(), 1001);
    }

    #[test]
    fn decode_tr_configuration_applies_pre_303_xor_mask() {
        let mut configuration = [0u8; CONFIGURATION_LEN];
        configuration[0x04] = 0x34; // becomes 0x00 after unmasking -> no flags set
        let decoded = decode_tr_configuration(&configuration, 0, 0x0300, false);
        assert!(!decoded.custom_dpa_handler);
        assert_eq!(decoded.dpa_peer_to_peer, None); // gated on >= 4.10
    }

    #[test]
    fn decode_tr_configuration_reports_rf_band_from_undocumented_byte() {
        let configuration = [0u8; CONFIGURATION_LEN];
        let decoded = decode_tr_configuration(&configuration, 0b10, 0x0400, false);
        assert_eq!(decoded.rf_band, "433");
    }

    #[test]
    fn decode_tr_configuration_ignores_rf_channel_a_for_rf_band() {
        // rfChannelA (configuration[0x10]) must not be mistaken for the
        // undocumented rfBand byte.
        let mut configuration = [0u8; CONFIGURATION_LEN];
        configuration[0x10] = 0b10;
        let decoded = decode_tr_configuration(&configuration, 0, 0x0400, false);
        assert_eq!(decoded.rf_band, "868");
    }

    #[test]
    fn decode_tr_configuration_gates_local_frc_reception_on_version_and_address() {
        let mut configuration = [0u8; CONFIGURATION_LEN];
        configuration[0x0c] = 0b1;
        let node = decode_tr_configuration(&configuration, 0, 0x0415, false);
        assert_eq!(node.local_frc_reception, Some(true));
        let coordinator = decode_tr_configuration(&configuration, 0, 0x0415, true);
        assert_eq!(coordinator.local_frc_reception, None);
        let old_version = decode_tr_configuration(&configuration, 0, 0x0410, false);
        assert_eq!(old_version.local_frc_reception, None);
    }
}
