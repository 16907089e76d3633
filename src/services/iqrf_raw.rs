//! `iqrfRaw`/`iqrfRawHdp`: thin DPA pass-through. No bonding, no retries —
//! the caller's bytes go on the wire and whatever comes back is reported
//! verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::dpa::{DpaMessage, hex_dot_decode, hex_dot_encode};
use crate::engine::DpaEngine;
use crate::splitter::{ServiceHandler, envelope};

use super::common::{ServiceError, build_response};

const RAW_TAG: &str = "iqrfRaw";
const RAW_HDP_TAG: &str = "iqrfRawHdp";

fn parse_hex_byte(value: &Value, field: &str) -> Result<u8, ServiceError> {
    let text = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::RequestParse(format!("missing {field}")))?;
    u8::from_str_radix(text.trim_start_matches("0x"), 16).map_err(|_| ServiceError::RequestParse(format!("bad hex in {field}: {text}")))
}

fn parse_hex_u16(value: &Value, field: &str) -> Result<u16, ServiceError> {
    let text = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::RequestParse(format!("missing {field}")))?;
    u16::from_str_radix(text.trim_start_matches("0x"), 16).map_err(|_| ServiceError::RequestParse(format!("bad hex in {field}: {text}")))
}

/// Registered for `iqrfRaw`: the request carries a full, already-framed
/// DPA request as a hex-dot string; the response echoes the raw bytes back.
pub struct IqrfRawHandler {
    engine: Arc<dyn DpaEngine>,
}

impl IqrfRawHandler {
    /// Builds the handler over a shared engine.
    #[must_use]
    pub fn new(engine: Arc<dyn DpaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ServiceHandler for IqrfRawHandler {
    async fn handle(&self, request: Value) -> Value {
        let msg_id = envelope::extract_msg_id(&request);
        let verbose = envelope::extract_return_verbose(&request);
        let timeout_ms = envelope::extract_timeout_ms(&request);

        let bytes = match request
            .get("data")
            .and_then(|d| d.get("req"))
            .and_then(|r| r.get("request"))
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::RequestParse("missing data.req.request".to_string()))
            .and_then(|text| hex_dot_decode(text).map_err(|err| ServiceError::RequestParse(err.to_string())))
        {
            Ok(bytes) => bytes,
            Err(err) => {
                return build_response(RAW_TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[]);
            }
        };

        let result = match timeout_ms {
            Some(ms) => self.engine.execute_with_timeout(DpaMessage::new(bytes), ms).await,
            None => self.engine.execute(DpaMessage::new(bytes)).await,
        };

        match result {
            Ok(record) => {
                let response_hex = record.response.as_ref().map_or_else(String::new, |r| hex_dot_encode(r.as_bytes()));
                let rsp = json!({"response": response_hex});
                build_response(RAW_TAG, &msg_id, 0, "ok", rsp, verbose, std::slice::from_ref(&record))
            }
            Err(err) => {
                let err = ServiceError::from(err);
                build_response(RAW_TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[])
            }
        }
    }
}

/// Registered for `iqrfRawHdp`: the request carries `nAdr`/`pNum`/`pCmd`/
/// `hwpId` as hex strings and `rData` as hex-dot peripheral data; the
/// response breaks the reply down the same way.
pub struct IqrfRawHdpHandler {
    engine: Arc<dyn DpaEngine>,
}

impl IqrfRawHdpHandler {
    /// Builds the handler over a shared engine.
    #[must_use]
    pub fn new(engine: Arc<dyn DpaEngine>) -> Self {
        Self { engine }
    }
}

fn parse_hdp_request(request: &Value) -> Result<DpaMessage, ServiceError> {
    let req = request
        .get("data")
        .and_then(|d| d.get("req"))
        .ok_or_else(|| ServiceError::RequestParse("missing data.req".to_string()))?;

    let nadr = parse_hex_u16(req, "nAdr")?;
    let pnum = parse_hex_byte(req, "pNum")?;
    let pcmd = parse_hex_byte(req, "pCmd")?;
    let hwpid = parse_hex_u16(req, "hwpId")?;
    let rdata = req
        .get("rData")
        .and_then(Value::as_str)
        .map(hex_dot_decode)
        .transpose()
        .map_err(|err| ServiceError::RequestParse(err.to_string()))?
        .unwrap_or_default();

    let mut bytes = vec![(nadr & 0xFF) as u8, (nadr >> 8) as u8, pnum, pcmd, (hwpid & 0xFF) as u8, (hwpid >> 8) as u8];
    bytes.extend_from_slice(&rdata);
    Ok(DpaMessage::new(bytes))
}

#[async_trait]
impl ServiceHandler for IqrfRawHdpHandler {
    async fn handle(&self, request: Value) -> Value {
        let msg_id = envelope::extract_msg_id(&request);
        let verbose = envelope::extract_return_verbose(&request);
        let timeout_ms = envelope::extract_timeout_ms(&request);

        let dpa_request = match parse_hdp_request(&request) {
            Ok(dpa_request) => dpa_request,
            Err(err) => {
                return build_response(RAW_HDP_TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[]);
            }
        };

        let result = match timeout_ms {
            Some(ms) => self.engine.execute_with_timeout(dpa_request, ms).await,
            None => self.engine.execute(dpa_request).await,
        };

        match result {
            Ok(record) => {
                let rsp = record.response.as_ref().map_or_else(
                    || json!({"nAdr": "", "pNum": "", "pCmd": "", "hwpId": "", "rCode": "", "dpaVal": "", "rData": ""}),
                    |resp| {
                        json!({
                            "nAdr": format!("{:02X}", resp.nadr().unwrap_or(0)),
                            "pNum": format!("{:02X}", resp.pnum().unwrap_or(0)),
                            "pCmd": format!("{:02X}", resp.pcmd().unwrap_or(0)),
                            "hwpId": format!("{:04X}", resp.hwpid().unwrap_or(0)),
                            "rCode": resp.pdata().first().map_or_else(String::new, |b| format!("{b:02X}")),
                            "dpaVal": resp.pdata().get(1).map_or_else(String::new, |b| format!("{b:02X}")),
                            "rData": hex_dot_encode(resp.pdata().get(2..).unwrap_or(&[])),
                        })
                    },
                );
                build_response(RAW_HDP_TAG, &msg_id, 0, "ok", rsp, verbose, std::slice::from_ref(&record))
            }
            Err(err) => {
                let err = ServiceError::from(err);
                build_response(RAW_HDP_TAG, &msg_id, err.status_code(), &err.to_string(), json!({}), verbose, &[])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hdp_request_builds_header_and_rdata() {
        let request = json!({"data": {"msgId": "x", "req": {
            "nAdr": "01", "pNum": "00", "pCmd": "00", "hwpId": "FFFF", "rData": "AA.BB"
        }}});
        let dpa_request = parse_hdp_request(&request).unwrap();
        assert_eq!(dpa_request.as_bytes(), &[0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xAA, 0xBB]);
    }

    #[test]
    fn parse_hdp_request_rejects_missing_field() {
        let request = json!({"data": {"msgId": "x", "req": {"pNum": "00", "pCmd": "00", "hwpId": "0000"}}});
        let err = parse_hdp_request(&request).unwrap_err();
        assert_eq!(err.status_code(), 1001);
    }
}
