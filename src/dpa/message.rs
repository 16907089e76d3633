//! Opaque DPA byte frames and the hex-dot wire encoding used in verbose
//! API responses.
//!
//! The engine and channel never interpret these bytes beyond the header
//! fields services need (NADR/PNUM/PCMD/HWPID); framing details are out of
//! scope for this crate.

use thiserror::Error;

/// A single DPA frame: request, confirmation or response bytes. The first
/// four bytes are the common header (`NADR` low, `NADR` high, `PNUM`,
/// `PCMD`); anything after that is peripheral-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpaMessage(pub Vec<u8>);

impl DpaMessage {
    /// Builds a frame from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The `NADR` (network address) field, if present.
    #[must_use]
    pub fn nadr(&self) -> Option<u8> {
        self.0.first().copied()
    }

    /// The `PNUM` (peripheral number) field, if present.
    #[must_use]
    pub fn pnum(&self) -> Option<u8> {
        self.0.get(2).copied()
    }

    /// The `PCMD` (peripheral command) field, if present.
    #[must_use]
    pub fn pcmd(&self) -> Option<u8> {
        self.0.get(3).copied()
    }

    /// Peripheral data beyond the fixed header fields present on both
    /// requests and responses (`NADR`(2) `PNUM`(1) `PCMD`(1) `HWPID`(2)).
    #[must_use]
    pub fn pdata(&self) -> &[u8] {
        self.0.get(6..).unwrap_or(&[])
    }

    /// The `HWPID` field (bytes 4-5, little-endian), if present. On a
    /// response this is the responding device's actual HWPID, useful
    /// when the request itself used `HWPID_DoNotCheck`.
    #[must_use]
    pub fn hwpid(&self) -> Option<u16> {
        self.0.get(4..6).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Errors from decoding a hex-dot encoded frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexDotError {
    /// A group was not exactly two hex digits.
    #[error("group {0:?} is not a two-digit hex byte")]
    BadGroup(String),
}

/// Encodes bytes as two-digit uppercase hex groups separated by `.`, the
/// format used for `data.raw[].request`/`confirmation`/`response`.
#[must_use]
pub fn hex_dot_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Inverse of [`hex_dot_encode`].
pub fn hex_dot_decode(text: &str) -> Result<Vec<u8>, HexDotError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split('.')
        .map(|group| {
            if group.len() != 2 {
                return Err(HexDotError::BadGroup(group.to_string()));
            }
            u8::from_str_radix(group, 16).map_err(|_| HexDotError::BadGroup(group.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dot_round_trips() {
        let bytes = vec![0x00, 0xAB, 0xFF, 0x0A];
        let encoded = hex_dot_encode(&bytes);
        assert_eq!(encoded, "00.AB.FF.0A");
        assert_eq!(hex_dot_decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn hex_dot_decode_empty_is_empty() {
        assert_eq!(hex_dot_decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_dot_decode_rejects_bad_group() {
        assert_eq!(
            hex_dot_decode("0.AB"),
            Err(HexDotError::BadGroup("0".to_string()))
        );
    }

    #[test]
    fn header_accessors() {
        let msg = DpaMessage::new(vec![0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xAA, 0xBB]);
        assert_eq!(msg.nadr(), Some(0x01));
        assert_eq!(msg.pnum(), Some(0x00));
        assert_eq!(msg.pcmd(), Some(0x00));
        assert_eq!(msg.hwpid(), Some(0xFFFF));
        assert_eq!(msg.pdata(), &[0xAA, 0xBB]);
    }
}
