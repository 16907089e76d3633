//! Engine-local domain types: coordinator identity, timing/RF knobs, and
//! the bonded-device bitmap.

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::domain_types::{DpaVersion, Hwpid, HwpidVer, Mid};

/// Supported RF communication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RfMode {
    /// Standard mode only.
    Std,
    /// Low-power mode only.
    Lp,
    /// Both standard and low-power.
    LpAndStd,
}

/// Transceiver/MCU family, as reported by an OS-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct McuType {
    /// Raw transceiver type byte.
    pub transceiver: u8,
    /// Raw MCU type byte.
    pub mcu: u8,
}

/// Cached identity of the attached coordinator, populated after reset and
/// invalidated on every subsequent observed reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorParameters {
    /// 4-byte module id.
    pub mid: Option<[u8; 4]>,
    /// OS version, as a raw byte (e.g. `0x41` encodes "4.1x").
    pub os_version: Option<u8>,
    /// OS build word.
    pub os_build: Option<u16>,
    /// DPA protocol version.
    pub dpa_version: Option<(u8, u8)>,
    /// Coordinator's own HWPID.
    pub hwpid: Option<u16>,
    /// Coordinator's own HWPID version.
    pub hwpid_ver: Option<u16>,
    /// Transceiver/MCU identity.
    pub mcu_type: Option<(u8, u8)>,
    /// Whether STD mode is supported.
    pub std_supported: bool,
    /// Whether LP mode is supported.
    pub lp_supported: bool,
    /// Whether this is a demo (non-licensed) coordinator.
    pub demo: bool,
}

impl Default for CoordinatorParameters {
    fn default() -> Self {
        Self {
            mid: None,
            os_version: None,
            os_build: None,
            dpa_version: None,
            hwpid: None,
            hwpid_ver: None,
            mcu_type: None,
            std_supported: true,
            lp_supported: false,
            demo: false,
        }
    }
}

impl CoordinatorParameters {
    /// The DPA version as a structured [`DpaVersion`], if known.
    #[must_use]
    pub fn dpa_version(&self) -> Option<DpaVersion> {
        self.dpa_version.map(|(major, minor)| DpaVersion { major, minor })
    }

    /// The module id as a [`Mid`], if known.
    #[must_use]
    pub fn mid_typed(&self) -> Option<Mid> {
        self.mid.map(Mid)
    }

    /// The coordinator's own HWPID, if known.
    #[must_use]
    pub fn hwpid_typed(&self) -> Option<Hwpid> {
        self.hwpid.map(Hwpid::new)
    }

    /// The coordinator's own HWPID version, if known.
    #[must_use]
    pub fn hwpid_ver_typed(&self) -> Option<HwpidVer> {
        self.hwpid_ver.map(HwpidVer::new)
    }
}

/// 240-bit membership vector returned by `CMD_COORDINATOR_BONDED_DEVICES`.
/// Bit N set means address N is currently bonded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedBitmap([u8; 30]);

impl BondedBitmap {
    /// Builds a bitmap from the 30 raw bytes returned by the coordinator.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 30]) -> Self {
        Self(bytes)
    }

    /// An empty (no devices bonded) bitmap, useful in tests.
    #[must_use]
    pub fn empty() -> Self {
        Self([0u8; 30])
    }

    /// True if `address` is bonded.
    #[must_use]
    pub fn is_bonded(&self, address: u8) -> bool {
        let byte = address / 8;
        let bit = address % 8;
        (self.0[byte as usize] & (1 << bit)) != 0
    }

    /// Finds the lowest free address in `0..=239`, if any.
    #[must_use]
    pub fn first_free(&self) -> Option<u8> {
        (0..=crate::domain_types::MAX_ADDRESS).find(|&addr| !self.is_bonded(addr))
    }
}

/// Transaction timeout in milliseconds. Negative/absent means "use the
/// engine's default based on current timing parameters".
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize))]
pub struct TimeoutMs(u32);

/// DPA timing parameters affecting the default transaction timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingParams {
    /// Base response timeout in milliseconds.
    pub response_timeout_ms: u32,
    /// Number of bonded-network hops to budget extra time for.
    pub bonded_nodes: u16,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1000,
            bonded_nodes: 0,
        }
    }
}

impl TimingParams {
    /// The default transaction timeout derived from these parameters.
    #[must_use]
    pub fn default_timeout_ms(&self) -> u32 {
        self.response_timeout_ms + u32::from(self.bonded_nodes) * 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonded_bitmap_tracks_bits() {
        let mut bytes = [0u8; 30];
        bytes[0] = 0b0010_0000; // bit 5
        let bitmap = BondedBitmap::from_bytes(bytes);
        assert!(bitmap.is_bonded(5));
        assert!(!bitmap.is_bonded(4));
    }

    #[test]
    fn bonded_bitmap_first_free_skips_bonded() {
        let mut bytes = [0u8; 30];
        bytes[0] = 0b0000_0001; // address 0 bonded
        let bitmap = BondedBitmap::from_bytes(bytes);
        assert_eq!(bitmap.first_free(), Some(1));
    }

    #[test]
    fn fully_bonded_network_has_no_free_address() {
        let bitmap = BondedBitmap::from_bytes([0xFF; 30]);
        assert_eq!(bitmap.first_free(), None);
    }
}
