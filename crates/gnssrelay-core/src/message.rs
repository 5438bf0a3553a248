//! Decoded GNSS messages and the protocol enumeration they belong to.

use std::fmt;

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire protocol a message was framed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolTag {
    Nmea,
    Ubx,
    Sbf,
    Rtcm3,
    Spartn,
    Other,
}

impl ProtocolTag {
    /// Returns the display name used in logs and parsed output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nmea => "NMEA",
            Self::Ubx => "UBX",
            Self::Sbf => "SBF",
            Self::Rtcm3 => "RTCM3",
            Self::Spartn => "SPARTN",
            Self::Other => "OTHER",
        }
    }

    /// Returns the protocol filter bit for this tag.
    ///
    /// `Other` has no bit and is never enabled by a mask.
    pub fn mask(&self) -> ProtocolMask {
        match self {
            Self::Nmea => ProtocolMask::NMEA,
            Self::Ubx => ProtocolMask::UBX,
            Self::Sbf => ProtocolMask::SBF,
            Self::Rtcm3 => ProtocolMask::RTCM3,
            Self::Spartn => ProtocolMask::SPARTN,
            Self::Other => ProtocolMask::empty(),
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Protocol filter bitmask (`protfilter`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProtocolMask: u32 {
        const NMEA = 1;
        const UBX = 2;
        const RTCM3 = 4;
        const SBF = 8;
        const SPARTN = 16;
    }
}

impl ProtocolMask {
    /// NMEA, UBX and RTCM3: the default receiver output mix.
    pub const DEFAULT: Self = Self::NMEA.union(Self::UBX).union(Self::RTCM3);

    /// Returns true if messages with this tag are enabled.
    pub fn allows(&self, tag: ProtocolTag) -> bool {
        let bit = tag.mask();
        !bit.is_empty() && self.contains(bit)
    }
}

impl Default for ProtocolMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A slice of the source stream with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Byte offset of the first byte within the source stream.
    pub offset: u64,
    pub bytes: Bytes,
}

impl RawFrame {
    pub fn new(offset: u64, bytes: impl Into<Bytes>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A message recognized by one of the framing codecs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub protocol: ProtocolTag,
    /// Identity within the protocol, e.g. `NAV-PVT`, `GNGGA` or `1005`.
    pub identity: String,
    /// Decoded payload fields, in wire order.
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub raw: Bytes,
}

impl DecodedMessage {
    pub fn new(protocol: ProtocolTag, identity: impl Into<String>, raw: impl Into<Bytes>) -> Self {
        Self {
            protocol,
            identity: identity.into(),
            fields: Map::new(),
            raw: raw.into(),
        }
    }

    /// Add a payload field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Looks up a numeric field.
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// Looks up a string field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Two messages are identity-equal when protocol and identity match.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.protocol == other.protocol && self.identity == other.identity
    }

    /// JSON document form: `{"protocol": .., "identity": .., "payload": {..}}`.
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("protocol".into(), Value::from(self.protocol.as_str()));
        doc.insert("identity".into(), Value::from(self.identity.clone()));
        doc.insert("payload".into(), Value::Object(self.fields.clone()));
        Value::Object(doc)
    }
}

impl fmt::Display for DecodedMessage {
    /// Renders as `<UBX(NAV-PVT, iTOW=1000, lat=51.5)>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}({}", self.protocol, self.identity)?;
        for (name, value) in &self.fields {
            match value {
                Value::String(s) => write!(f, ", {name}={s}")?,
                other => write!(f, ", {name}={other}")?,
            }
        }
        f.write_str(")>")
    }
}
