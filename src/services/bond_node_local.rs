//! `iqmeshNetwork_BondNodeLocal`: bond a single node already in
//! listening-for-bond mode at a chosen or automatically selected address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain_types::{Address, MAX_ADDRESS};
use crate::engine::{BondedBitmap, DpaEngine};
use crate::splitter::{ServiceHandler, envelope};

use super::common::{DeviceCache, ServiceError, build_request, build_response, dpa_const::*};

const TAG: &str = "iqmeshNetwork_BondNodeLocal";
const POST_BOND_SETTLE: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct BondNodeParams {
    device_addr: u8,
    bonding_test_retries: u8,
}

fn parse_request(request: &Value) -> Result<BondNodeParams, ServiceError> {
    let req = request
        .get("data")
        .and_then(|d| d.get("req"))
        .ok_or_else(|| ServiceError::RequestParse("missing data.req".to_string()))?;

    let device_addr = req.get("deviceAddr").and_then(Value::as_u64).unwrap_or(0);
    if device_addr > u64::from(MAX_ADDRESS) {
        return Err(ServiceError::RequestParse(format!("deviceAddr {device_addr} out of range")));
    }
    let bonding_test_retries = req.get("bondingTestRetries").and_then(Value::as_u64).unwrap_or(1);

    Ok(BondNodeParams { device_addr: device_addr as u8, bonding_test_retries: bonding_test_retries as u8 })
}

/// Registered for `iqmeshNetwork_BondNodeLocal`.
pub struct BondNodeLocalHandler {
    engine: Arc<dyn DpaEngine>,
    cache: Arc<dyn DeviceCache>,
}

impl BondNodeLocalHandler {
    /// Builds the handler over a shared engine and device cache.
    #[must_use]
    pub fn new(engine: Arc<dyn DpaEngine>, cache: Arc<dyn DeviceCache>) -> Self {
        Self { engine, cache }
    }
}

#[async_trait]
impl ServiceHandler for BondNodeLocalHandler {
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

async fn run(
    lease: &crate::engine::ExclusiveLease,
    cache: &dyn DeviceCache,
    params: &BondNodeParams,
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

    let bond_request = build_request(
        0,
        PNUM_COORDINATOR,
        CMD_COORDINATOR_BOND_NODE,
        HWPID_DO_NOT_CHECK,
        &[params.device_addr, params.bonding_test_retries],
    );
    let bond_record = lease.execute(bond_request).await?;
    let (bonded_addr, nodes_nr) = bond_record
        .response
        .as_ref()
        .map(|resp| (resp.pdata().first().copied().unwrap_or(0), resp.pdata().get(1).copied().unwrap_or(0)))
        .unwrap_or((0, 0));
    records.push(bond_record);

    tokio::time::sleep(POST_BOND_SETTLE).await;

    let enum_request = build_request(bonded_addr, PNUM_ENUMERATION, CMD_GET_PER_INFO, HWPID_DO_NOT_CHECK, &[]);
    let enum_record = lease.execute(enum_request).await?;
    let hwpid_ver = enum_record.response.as_ref().and_then(|r| r.pdata().get(..2)).map_or(0, |b| u16::from_le_bytes([b[0], b[1]]));
    records.push(enum_record);

    let os_request = build_request(bonded_addr, PNUM_OS, CMD_OS_READ, HWPID_DO_NOT_CHECK, &[]);
    let os_record = lease.execute(os_request).await?;
    let hwpid = os_record.response.as_ref().and_then(crate::dpa::DpaMessage::hwpid).unwrap_or(0);
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
    use crate::services::common::NullDeviceCache;

    #[test]
    fn parse_request_rejects_out_of_range_address() {
        let request = json!({"data": {"msgId": "x", "req": {"deviceAddr": 300}}});
        let err = parse_request(&request).unwrap_err();
        assert_eq!(err.status_code(), 1001);
    }

    #[test]
    fn parse_request_defaults_retries_to_one() {
        let request = json!({"data": {"msgId": "x", "req": {"deviceAddr": 5}}});
        let params = parse_request(&request).unwrap();
        assert_eq!(params.bonding_test_retries, 1);
    }

    #[test]
    fn device_cache_miss_yields_default_info() {
        let cache = NullDeviceCache;
        assert_eq!(cache.lookup(0x1234, 1, 100, "4.15"), None);
    }
}
