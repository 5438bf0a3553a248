//! Output representations of accepted messages.
//!
//! A [`FormatSpec`] is a bitmask; every set bit yields one [`Representation`]
//! per message and all of them travel together in one [`OutputEvent`]:
//!
//! | bit | representation |
//! |-----|----------------|
//! | 1   | parsed object |
//! | 2   | raw binary |
//! | 4   | hex string |
//! | 8   | tabulated hex |
//! | 16  | parsed string |
//! | 32  | JSON |
//!
//! When the mask is exactly JSON the stream forms a single document,
//! `{"GNSS_Messages": [ ... ]}`, whose opening and closing are emitted as
//! separate events by [`Formatter::preamble`] and [`Formatter::postamble`].

use std::fmt::Write as _;

use bitflags::bitflags;
use bytes::Bytes;

use crate::error::{CoreError, CoreResult};
use crate::message::{DecodedMessage, ProtocolTag};

const JSON_PREAMBLE: &str = "{\"GNSS_Messages\": [";
const JSON_POSTAMBLE: &str = "]}";
/// Two-byte groups per hex table row.
const HEXTABLE_COLUMNS: usize = 8;

bitflags! {
    /// Output format bitmask (`format`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatSpec: u32 {
        const PARSED = 1;
        const BINARY = 2;
        const HEX = 4;
        const HEXTABLE = 8;
        const PARSED_STRING = 16;
        const JSON = 32;
    }
}

impl FormatSpec {
    pub fn from_value(value: u32) -> CoreResult<Self> {
        Self::from_bits(value).ok_or(CoreError::InvalidFormat(value))
    }
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self::PARSED
    }
}

/// One rendering of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Parsed(DecodedMessage),
    Raw(Bytes),
    Hex(String),
    HexTable(String),
    ParsedString(String),
    Json(String),
}

impl Representation {
    /// The format bit that produced this representation.
    pub fn kind(&self) -> FormatSpec {
        match self {
            Self::Parsed(_) => FormatSpec::PARSED,
            Self::Raw(_) => FormatSpec::BINARY,
            Self::Hex(_) => FormatSpec::HEX,
            Self::HexTable(_) => FormatSpec::HEXTABLE,
            Self::ParsedString(_) => FormatSpec::PARSED_STRING,
            Self::Json(_) => FormatSpec::JSON,
        }
    }

    /// Text form, as printed to a terminal or text file.
    pub fn to_text(&self) -> String {
        match self {
            Self::Parsed(message) => message.to_string(),
            Self::Raw(bytes) => bytes_literal(bytes),
            Self::Hex(text) | Self::ParsedString(text) | Self::Json(text) => text.clone(),
            Self::HexTable(text) => text.trim_end_matches('\n').to_string(),
        }
    }

    /// Byte form, as written to binary sinks. Raw frames are passed through
    /// unchanged; text forms are newline terminated.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Raw(bytes) => bytes.clone(),
            other => {
                let mut text = other.to_text();
                text.push('\n');
                Bytes::from(text)
            }
        }
    }
}

/// Everything produced for one accepted message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    /// Absent for stream framing events such as the JSON wrapper.
    pub identity: Option<String>,
    pub protocol: Option<ProtocolTag>,
    pub representations: Vec<Representation>,
}

impl OutputEvent {
    fn framing(text: &str) -> Self {
        Self {
            identity: None,
            protocol: None,
            representations: vec![Representation::Json(text.to_string())],
        }
    }

    pub fn get(&self, kind: FormatSpec) -> Option<&Representation> {
        self.representations.iter().find(|r| r.kind() == kind)
    }
}

/// Produces output events for accepted messages.
#[derive(Debug, Clone)]
pub struct Formatter {
    spec: FormatSpec,
    emitted: u64,
}

impl Formatter {
    pub fn new(spec: FormatSpec) -> Self {
        Self { spec, emitted: 0 }
    }

    pub fn spec(&self) -> FormatSpec {
        self.spec
    }

    fn wraps_json(&self) -> bool {
        self.spec == FormatSpec::JSON
    }

    /// Opening of the JSON document, if the mask is exactly JSON.
    pub fn preamble(&self) -> Option<OutputEvent> {
        self.wraps_json().then(|| OutputEvent::framing(JSON_PREAMBLE))
    }

    /// Closing of the JSON document, if the mask is exactly JSON.
    pub fn postamble(&self) -> Option<OutputEvent> {
        self.wraps_json().then(|| OutputEvent::framing(JSON_POSTAMBLE))
    }

    /// Render `message`; `None` when the mask is empty.
    pub fn format(&mut self, message: &DecodedMessage) -> Option<OutputEvent> {
        if self.spec.is_empty() {
            return None;
        }

        let mut representations = Vec::with_capacity(self.spec.bits().count_ones() as usize);
        for kind in self.spec.iter() {
            let rendered = match kind {
                FormatSpec::PARSED => Representation::Parsed(message.clone()),
                FormatSpec::BINARY => Representation::Raw(message.raw.clone()),
                FormatSpec::HEX => Representation::Hex(hex_string(&message.raw)),
                FormatSpec::HEXTABLE => Representation::HexTable(hextable(&message.raw)),
                FormatSpec::PARSED_STRING => Representation::ParsedString(message.to_string()),
                FormatSpec::JSON => {
                    let json = message.to_json().to_string();
                    if self.wraps_json() && self.emitted > 0 {
                        Representation::Json(format!(",{json}"))
                    } else {
                        Representation::Json(json)
                    }
                }
                _ => continue,
            };
            representations.push(rendered);
        }
        self.emitted += 1;

        Some(OutputEvent {
            identity: Some(message.identity.clone()),
            protocol: Some(message.protocol),
            representations,
        })
    }
}

/// Lower-case hex without separators.
pub fn hex_string(raw: &[u8]) -> String {
    raw.iter().fold(String::with_capacity(raw.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Render bytes as a quoted byte literal, e.g. `b'$GP\r\n'`.
pub fn bytes_literal(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() + 3);
    out.push_str("b'");
    for &b in raw {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('\'');
    out
}

/// Tabulated hex: 16 bytes per row as `OOO: hhhh hhhh ...  | b'...' |`.
pub fn hextable(raw: &[u8]) -> String {
    let row_len = HEXTABLE_COLUMNS * 2;
    let mut table = String::new();
    for (row, chunk) in raw.chunks(row_len).enumerate() {
        let _ = write!(table, "{:03}: ", row * row_len);
        for col in 0..HEXTABLE_COLUMNS {
            match chunk.get(col * 2..(col * 2 + 2).min(chunk.len())) {
                Some(group) if !group.is_empty() => {
                    let hex = hex_string(group);
                    let _ = write!(table, "{hex:<4} ");
                }
                _ => table.push_str("     "),
            }
        }
        let _ = writeln!(table, " | {} |", bytes_literal(chunk));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &[u8] =
        b"$GPGGA,123519.00,4807.03800,S,01131.00000,E,2,08,0.9,545.4,M,46.9,M,,*77\r\n";

    fn gga() -> DecodedMessage {
        DecodedMessage::new(ProtocolTag::Nmea, "GPGGA", GGA).with_field("quality", 2)
    }

    #[test]
    fn hextable_matches_reference_layout() {
        insta::assert_snapshot!(hextable(GGA), @r"
        000: 2447 5047 4741 2c31 3233 3531 392e 3030  | b'$GPGGA,123519.00' |
        016: 2c34 3830 372e 3033 3830 302c 532c 3031  | b',4807.03800,S,01' |
        032: 3133 312e 3030 3030 302c 452c 322c 3038  | b'131.00000,E,2,08' |
        048: 2c30 2e39 2c35 3435 2e34 2c4d 2c34 362e  | b',0.9,545.4,M,46.' |
        064: 392c 4d2c 2c2a 3737 0d0a                 | b'9,M,,*77\r\n' |
        ");
    }

    #[test]
    fn hextable_binary_and_odd_length() {
        let raw = b"\xb5b\x06\x8b\x0c\x00\x00\x00\x00\x00\x68\x00\x11\x40\xb6\xf3\x9d\x3f\xdb";
        let table = hextable(raw);
        let last = table.lines().last().unwrap();
        assert_eq!(
            last,
            format!("016: 9d3f db{}| b'\\x9d?\\xdb' |", " ".repeat(34))
        );
    }

    #[test]
    fn emits_one_representation_per_bit() {
        let mut formatter = Formatter::new(FormatSpec::BINARY | FormatSpec::HEXTABLE);
        let event = formatter.format(&gga()).unwrap();
        assert_eq!(event.identity.as_deref(), Some("GPGGA"));
        assert_eq!(event.representations.len(), 2);
        assert_eq!(
            event.get(FormatSpec::BINARY),
            Some(&Representation::Raw(Bytes::from_static(GGA)))
        );
        assert!(matches!(
            event.get(FormatSpec::HEXTABLE),
            Some(Representation::HexTable(t)) if t.starts_with("000: 2447")
        ));
    }

    #[test]
    fn empty_mask_suppresses_output() {
        let mut formatter = Formatter::new(FormatSpec::empty());
        assert!(formatter.format(&gga()).is_none());
        assert!(formatter.preamble().is_none());
    }

    #[test]
    fn json_only_is_wrapped_and_comma_separated() {
        let mut formatter = Formatter::new(FormatSpec::JSON);
        let open = formatter.preamble().unwrap();
        let first = formatter.format(&gga()).unwrap();
        let second = formatter.format(&gga()).unwrap();
        let close = formatter.postamble().unwrap();

        let text: String = [open, first, second, close]
            .iter()
            .map(|e| e.representations[0].to_text())
            .collect();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["GNSS_Messages"].as_array().unwrap().len(), 2);
        assert_eq!(doc["GNSS_Messages"][0]["identity"], "GPGGA");
    }

    #[test]
    fn json_with_other_bits_is_not_wrapped() {
        let mut formatter = Formatter::new(FormatSpec::JSON | FormatSpec::HEX);
        assert!(formatter.preamble().is_none());
        formatter.format(&gga());
        let event = formatter.format(&gga()).unwrap();
        let Some(Representation::Json(json)) = event.get(FormatSpec::JSON) else {
            panic!("missing json");
        };
        assert!(json.starts_with('{'));
    }

    #[test]
    fn text_and_byte_forms() {
        let raw = Representation::Raw(Bytes::from_static(b"$A\r\n"));
        assert_eq!(raw.to_text(), "b'$A\\r\\n'");
        assert_eq!(raw.to_bytes(), Bytes::from_static(b"$A\r\n"));
        let hex = Representation::Hex("2441".into());
        assert_eq!(hex.to_bytes(), Bytes::from_static(b"2441\n"));
    }

    #[test]
    fn rejects_unknown_format_bits() {
        assert!(FormatSpec::from_value(63).is_ok());
        assert_eq!(FormatSpec::from_value(64), Err(CoreError::InvalidFormat(64)));
    }
}
