//! `iqmeshNetwork_SmartConnect`: bond a device by decoding its printed
//! IQRF Code rather than relying on listening-mode timing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain_types::{Address, DpaVersion, MAX_ADDRESS};
use crate::engine::{BondedBitmap, DpaEngine};
use crate::iqrf_code::{self, DecodedCode};
use crate::splitter::{ServiceHandler, envelope};

use super::common::{DeviceCache, ServiceError, build_request, build_response, dpa_const::*};

const TAG: &str = "iqmeshNetwork_SmartConnect";
const POST_BOND_SETTLE: Duration = Duration::from_millis(250);
const MIN_DPA_VERSION: (u8, u8) = (3, 3);
const USER_DATA_LEN: usize = 4;

#[derive(Debug)]
struct SmartConnectParams {
    device_addr: u8,
    bonding_test_retries: u8,
    code: DecodedCode,
    user_data: [u8; USER_DATA_LEN],
}

fn parse_request(request: &Value) -> Result<SmartConnectParams, ServiceError> {
    let req = request
        .get("data")
        .and_then(|d| d.get("req"))
        .ok_or_else(|| ServiceError::RequestParse("missing data.req".to_string()))?;

    let device_addr = req.get("deviceAddr").and_then(Value::as_u64).unwrap_or(0);
    if device_addr > u64::from(MAX_ADDRESS) {
        return Err(ServiceError::RequestParse(format!("deviceAddr {device_addr} out of range")));
    }
    let bonding_test_retries = req.get("bondingTestRetries").and_then(Value::as_u64).unwrap_or(1);

    let smart_connect_code = req
        .get("smartConnectCode")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::RequestParse("missing smartConnectCode".to_string()))?;
    let code = iqrf_code::decode(smart_connect_code).map_err(|err| ServiceError::RequestParse(err.to_string()))?;

    let mut user_data = [0u8; USER_DATA_LEN];
    if let Some(array) = req.get("userData").and_then(Value::as_array) {
        for (slot, value) in user_data.iter_mut().zip(array) {
            *slot = value.as_u64().unwrap_or(0) as u8;
        }
    }

    Ok(SmartConnectParams { device_addr: device_addr as u8, bonding_test_retries: bonding_test_retries as u8, code, user_data })
}

/// Registered for `iqmeshNetwork_SmartConnect`.
pub struct SmartConnectHandler {
    engine: Arc<dyn DpaEngine>,
    cache: Arc<dyn DeviceCache>,
}

impl SmartConnectHandler {
    /// Builds the handler over a shared engine and device cache.
    #[must_use]
    pub fn new(engine: Arc<dyn DpaEngine>, cache: Arc<dyn DeviceCache>) -> Self {
        Self { engine, cache }
    }
}

#[async_trait]
impl ServiceHandler for SmartConnectHandler {
    async fn handle(&self, request: Value) -> Value {
        let msg_id = envelope::extract_msg_id(&request);
        let verbose = envelope::extract_return_verbose(&request);

        let params = match parse_request(&request) {
            Ok(params) => params,
            Err(err) => {
                return build_response(TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[]);
            }
        };

        let dpa_version = self.engine.coordinator_parameters().dpa_version().unwrap_or(DpaVersion { major: 0, minor: 0 });
        if !dpa_version.at_least(MIN_DPA_VERSION.0, MIN_DPA_VERSION.1) {
            let err = ServiceError::Generic(format!("SmartConnect requires DPA >= 3.03, coordinator reports {dpa_version}"));
            return build_response(TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[]);
        }

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

fn smart_connect_payload(params: &SmartConnectParams) -> Vec<u8> {
    let ibk = params.code.ibk.clone().unwrap_or([0u8; 16]);
    let mid = params.code.mid.unwrap_or([0u8; 4]);
    let mid_reversed = {
        let mut m = mid;
        m.reverse();
        m
    };

    let mut payload = Vec::with_capacity(2 + 16 + 4 + 1 + 1 + 13 + USER_DATA_LEN);
    payload.push(params.device_addr);
    payload.push(params.bonding_test_retries);
    payload.extend_from_slice(&ibk);
    payload.extend_from_slice(&mid_reversed);
    payload.push(0x00); // reserved0
    payload.push(0xFF); // VirtualDeviceAddress
    payload.extend(std::iter::repeat(0u8).take(13)); // reserved1
    payload.extend_from_slice(&params.user_data);
    payload
}

async fn run(
    lease: &crate::engine::ExclusiveLease,
    cache: &dyn DeviceCache,
    params: &SmartConnectParams,
    records: &mut Vec<crate::dpa::DpaTransactionRecord>,
) -> Result<Value, ServiceError> {
    let bonded_request = build_request(0, PNUM_COORDINATOR, CMD_COORDINATOR_BONDED_DEVICES, HWPID_DO_NOT_CHECK, &[]);
    let bonded_record = lease.execute(bonded_request).await?;
    let bitmap = bonded_record
        .response
        .as_ref()
        .and_then(|resp| <[u8; 30]>::try_from(resp.pdata().get(..30).unwrap_or(&[])).ok())
        .map(BondedBitmap::from_bytes)
        .unwrap_or_else(BondedBitmap::empty);
    records.push(bonded_record);

    if params.device_addr == 0 {
        if bitmap.first_free().is_none() {
            return Err(ServiceError::NoFreeAddress);
        }
    } else if bitmap.is_bonded(params.device_addr) {
        return Err(ServiceError::AddressAlreadyBonded);
    }

    let payload = smart_connect_payload(params);
    let smart_connect_request =
        build_request(0, PNUM_COORDINATOR, CMD_COORDINATOR_SMART_CONNECT, HWPID_DO_NOT_CHECK, &payload);
    let smart_connect_record = lease.execute(smart_connect_request).await?;
    let (bonded_addr, nodes_nr) = smart_connect_record
        .response
        .as_ref()
        .map(|resp| (resp.pdata().first().copied().unwrap_or(0), resp.pdata().get(1).copied().unwrap_or(0)))
        .unwrap_or((0, 0));
    records.push(smart_connect_record);

    tokio::time::sleep(POST_BOND_SETTLE).await;

    let enum_request = build_request(bonded_addr, PNUM_ENUMERATION, CMD_GET_PER_INFO, HWPID_DO_NOT_CHECK, &[]);
    let enum_record = lease.execute(enum_request).await?;
    let hwpid_ver = enum_record.response.as_ref().and_then(|r| r.pdata().get(..2)).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    records.push(enum_record);

    let os_request = build_request(bonded_addr, PNUM_OS, CMD_OS_READ, HWPID_DO_NOT_CHECK, &[]);
    let os_record = lease.execute(os_request).await?;
    let hwpid = params.code.hwpid.or_else(|| os_record.response.as_ref().and_then(crate::dpa::DpaMessage::hwpid)).unwrap_or(0);
    let os_build = os_record
        .response
        .as_ref()
        .and_then(|r| r.pdata().get(7..9))
        .map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    records.push(os_record);

    let info = cache.lookup(hwpid, hwpid_ver, os_build, "").unwrap_or_default();
    let address = Address::try_new(bonded_addr).unwrap_or_else(|_| Address::coordinator());

    Ok(json!({
        "assignedAddr": address.into_inner(),
        "nodesNr": nodes_nr,
        "hwpId": hwpid,
        "hwpIdVer": hwpid_ver,
        "manufacturer": info.manufacturer,
        "product": info.product,
        "standards": info.standards,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_requires_smart_connect_code() {
        let request = json!({"data": {"msgId": "x", "req": {"deviceAddr": 0}}});
        let err = parse_request(&request).unwrap_err();
        assert_eq!(err.status_code(), 1001);
    }

    #[test]
    fn smart_connect_payload_reverses_mid_and_keeps_ibk_verbatim() {
        let params = SmartConnectParams {
            device_addr: 1,
            bonding_test_retries: 1,
            code: DecodedCode { mid: Some([0x01, 0x02, 0x03, 0x04]), ibk: Some([0xAA; 16]), hwpid: Some(0x1234) },
            user_data: [0; USER_DATA_LEN],
        };
        let payload = smart_connect_payload(&params);
        assert_eq!(&payload[2..18], &[0xAA; 16]);
        assert_eq!(&payload[18..22], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(payload[22], 0x00); // reserved0
        assert_eq!(payload[23], 0xFF); // VirtualDeviceAddress
    }
}
