//! Shared domain primitives used across the engine, splitter and services.
//!
//! Mirrors the teacher crate's primitive-obsession-avoidance style: every
//! value with a meaningful range or format gets its own `nutype` newtype
//! rather than travelling the codebase as a bare `u8`/`String`.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest valid node address; 0 is the coordinator, 1..=239 are nodes.
pub const MAX_ADDRESS: u8 = 239;

/// A mesh node address, 0..=239. Address 0 denotes the coordinator.
#[nutype(
    validate(less_or_equal = 239),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct Address(u8);

impl Address {
    /// The coordinator's own address.
    #[must_use]
    pub fn coordinator() -> Self {
        Self::try_new(0).unwrap()
    }

    /// True if this address is the coordinator's.
    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.into_inner() == 0
    }
}

/// A 4-byte module identifier, unique per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mid(pub [u8; 4]);

impl Mid {
    /// Returns the bytes in reversed order, as placed on the wire by
    /// `CMD_COORDINATOR_SMART_CONNECT`.
    #[must_use]
    pub fn reversed(&self) -> [u8; 4] {
        let mut out = self.0;
        out.reverse();
        out
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// A 16-byte individual bonding key used by SmartConnect.
#[derive(Clone, PartialEq, Eq)]
pub struct Ibk(pub [u8; 16]);

impl fmt::Debug for Ibk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ibk(<redacted 16 bytes>)")
    }
}

/// Device-type identifier.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct Hwpid(u16);

impl Hwpid {
    /// Sentinel value meaning "do not check HWPID" on outgoing requests.
    #[must_use]
    pub fn do_not_check() -> Self {
        Self::new(0xFFFF)
    }
}

/// Device-type version.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct HwpidVer(u16);

/// Semantic DPA protocol version, e.g. `4.15` encoded as `(4, 15)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DpaVersion {
    /// Major component.
    pub major: u8,
    /// Minor component.
    pub minor: u8,
}

impl DpaVersion {
    /// Builds a version from a raw DPA word (`major << 8 | minor`, as
    /// announced by the coordinator's reset notification).
    #[must_use]
    pub fn from_word(word: u16) -> Self {
        Self {
            major: (word >> 8) as u8,
            minor: (word & 0x00ff) as u8,
        }
    }

    /// True if this version is at least `major.minor`.
    #[must_use]
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for DpaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Identifier of a client-supplied request/response, used for correlation.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)
)]
pub struct MsgId(String);

impl MsgId {
    /// The placeholder used when a request carries no `msgId`.
    #[must_use]
    pub fn unknown() -> Self {
        Self::try_new("unknown").unwrap()
    }
}

/// The addressable identity of a request/response: a string tag plus a
/// semantic version. Lookup key is `"<tag>.<major>.<minor>.<micro>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageType {
    /// The `mType` tag, e.g. `iqmeshNetwork_SmartConnect`.
    pub tag: String,
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
    /// Micro version component.
    pub micro: u16,
}

impl MessageType {
    /// Builds a message type tagged with the default version `1.0.0`.
    #[must_use]
    pub fn with_default_version(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            major: 1,
            minor: 0,
            micro: 0,
        }
    }

    /// The registry lookup key: `"<tag>.<major>.<minor>.<micro>"`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}.{}.{}", self.tag, self.major, self.minor, self.micro)
    }

    /// Parses a dotted version string (`"1.0.0"`) against a tag, defaulting
    /// to `1.0.0` on malformed input, mirroring the original splitter's
    /// permissive parse.
    #[must_use]
    pub fn parse(tag: impl Into<String>, ver: Option<&str>) -> Self {
        let (mut major, mut minor, mut micro) = (1u16, 0u16, 0u16);
        if let Some(ver) = ver {
            let mut parts = ver.split('.');
            major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(major);
            minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(minor);
            micro = parts.next().and_then(|p| p.parse().ok()).unwrap_or(micro);
        }
        Self {
            tag: tag.into(),
            major,
            minor,
            micro,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Identifies a transport kind, e.g. `"MQ"`, `"MQTT"`, `"WS"`, `"UDP"`.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)
)]
pub struct TransportType(String);

/// Identifies a particular transport instance within its type.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)
)]
pub struct InstanceName(String);

/// `(transport-type, instance-name)` pair identifying an inbound/outbound
/// channel. Unique within the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessagingInstance {
    /// The transport kind.
    pub transport_type: TransportType,
    /// The instance name within that transport kind.
    pub instance_name: InstanceName,
}

impl MessagingInstance {
    /// Builds a new messaging instance identity.
    ///
    /// # Panics
    /// Panics if either argument is empty after trimming.
    #[must_use]
    pub fn new(transport_type: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            transport_type: TransportType::try_new(transport_type.into())
                .expect("transport type must be non-empty"),
            instance_name: InstanceName::try_new(instance_name.into())
                .expect("instance name must be non-empty"),
        }
    }
}

impl fmt::Display for MessagingInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport_type, self.instance_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_out_of_range() {
        assert!(Address::try_new(240).is_err());
        assert!(Address::try_new(239).is_ok());
    }

    #[test]
    fn message_type_key_round_trips_through_default_version() {
        let mt = MessageType::with_default_version("iqrfRaw");
        assert_eq!(mt.key(), "iqrfRaw.1.0.0");
    }

    #[test]
    fn message_type_parses_dotted_version() {
        let mt = MessageType::parse("iqmeshNetwork_SmartConnect", Some("1.2.3"));
        assert_eq!(mt.major, 1);
        assert_eq!(mt.minor, 2);
        assert_eq!(mt.micro, 3);
    }

    #[test]
    fn message_type_defaults_on_malformed_version() {
        let mt = MessageType::parse("x", Some("not-a-version"));
        assert_eq!((mt.major, mt.minor, mt.micro), (1, 0, 0));
    }

    #[test]
    fn mid_reverses_bytes() {
        let mid = Mid([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(mid.reversed(), [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn dpa_version_from_word() {
        let v = DpaVersion::from_word(0x0403);
        assert_eq!(v.major, 4);
        assert_eq!(v.minor, 3);
        assert!(v.at_least(4, 0));
        assert!(!v.at_least(4, 10));
    }
}
