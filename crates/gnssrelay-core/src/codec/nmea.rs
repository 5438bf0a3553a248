use serde_json::Value;

use super::checksum::nmea_checksum;
use super::{Decoded, Marker, ProtocolDecoder};
use crate::geo::dmm_to_degrees;
use crate::message::{DecodedMessage, ProtocolTag};

/// Longest line accepted before a missing terminator counts as corruption.
const MAX_SENTENCE_LEN: usize = 1024;

/// Field names for the position sentences whose payload is decoded.
const GGA_FIELDS: &[&str] = &[
    "time", "lat", "NS", "lon", "EW", "quality", "numSV", "HDOP", "alt", "altUnit", "sep",
    "sepUnit", "diffAge", "diffStation",
];
const RMC_FIELDS: &[&str] = &[
    "time", "status", "lat", "NS", "lon", "EW", "spd", "cog", "date", "mv", "mvEW", "posMode",
    "navStatus",
];
const GLL_FIELDS: &[&str] = &["lat", "NS", "lon", "EW", "time", "status", "posMode"];

/// `$TTMMM,...*hh\r\n` sentences.
#[derive(Debug, Default, Clone, Copy)]
pub struct NmeaDecoder;

impl ProtocolDecoder for NmeaDecoder {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Nmea
    }

    fn marker(&self, buf: &[u8]) -> Marker {
        match buf {
            [b'$'] => Marker::Undecided,
            [b'$', next, ..] if next.is_ascii_uppercase() => Marker::Match,
            _ => Marker::NoMatch,
        }
    }

    fn decode(&self, buf: &[u8], validate: bool) -> Decoded {
        let window = &buf[..buf.len().min(MAX_SENTENCE_LEN)];
        let Some(newline) = window.iter().position(|&b| b == b'\n') else {
            if buf.len() >= MAX_SENTENCE_LEN {
                return malformed("sentence has no terminator");
            }
            return Decoded::NeedMore;
        };
        let consumed = newline + 1;
        let line = trim_line_end(&buf[1..newline]);

        if !line.iter().all(|b| (0x20..0x7f).contains(b)) {
            return malformed("non-printable character in sentence");
        }

        let (body, checksum) = match line.iter().rposition(|&b| b == b'*') {
            Some(star) => (&line[..star], Some(&line[star + 1..])),
            None => (line, None),
        };
        if validate {
            let Some(expected) = checksum.and_then(parse_hex_byte) else {
                return malformed("missing or invalid checksum");
            };
            let actual = nmea_checksum(body);
            if actual != expected {
                return malformed(&format!(
                    "checksum mismatch: expected {expected:02X}, computed {actual:02X}"
                ));
            }
        }

        // Printable ASCII was checked above.
        let text = String::from_utf8_lossy(body);
        let mut parts = text.split(',');
        let address = parts.next().unwrap_or_default();
        let values: Vec<&str> = parts.collect();
        if address.len() < 3 {
            return malformed("sentence address too short");
        }

        let identity = identity_for(address, &values);
        let message = DecodedMessage::new(ProtocolTag::Nmea, identity, buf[..consumed].to_vec());
        Decoded::Message {
            message: decode_fields(message, address, &values),
            consumed,
        }
    }
}

fn malformed(reason: &str) -> Decoded {
    Decoded::Malformed {
        protocol: ProtocolTag::Nmea,
        reason: reason.to_string(),
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_hex_byte(digits: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(digits).ok()?;
    if text.len() != 2 {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

/// Talker plus sentence id (`GNGGA`), or the proprietary address with the
/// u-blox message number appended (`PUBX00`).
fn identity_for(address: &str, values: &[&str]) -> String {
    if address == "PUBX" {
        if let Some(number) = values.first() {
            return format!("{address}{number}");
        }
    }
    address.to_string()
}

fn decode_fields(mut message: DecodedMessage, address: &str, values: &[&str]) -> DecodedMessage {
    let sentence = if address.starts_with('P') {
        ""
    } else {
        &address[address.len() - 3..]
    };
    let names = match sentence {
        "GGA" => GGA_FIELDS,
        "RMC" => RMC_FIELDS,
        "GLL" => GLL_FIELDS,
        _ => &[],
    };

    if names.is_empty() {
        for (i, value) in values.iter().enumerate() {
            message.fields.insert(format!("field_{:02}", i + 1), Value::from(*value));
        }
        return message;
    }

    for (name, value) in names.iter().zip(values.iter()) {
        message.fields.insert((*name).to_string(), Value::from(*value));
    }
    let field = |name: &str| names.iter().position(|n| *n == name).and_then(|i| values.get(i));
    if let (Some(lat), Some(ns)) = (field("lat"), field("NS"))
        && let Some(deg) = dmm_to_degrees(lat, ns)
    {
        message.fields.insert("lat".into(), Value::from(deg));
    }
    if let (Some(lon), Some(ew)) = (field("lon"), field("EW"))
        && let Some(deg) = dmm_to_degrees(lon, ew)
    {
        message.fields.insert("lon".into(), Value::from(deg));
    }
    for numeric in ["quality", "numSV", "HDOP", "alt", "sep"] {
        if let Some(parsed) = field(numeric).and_then(|v| v.parse::<f64>().ok()) {
            message.fields.insert(numeric.to_string(), Value::from(parsed));
        }
    }
    message
}
