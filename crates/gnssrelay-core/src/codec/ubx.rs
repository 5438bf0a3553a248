use serde_json::Value;

use super::checksum::ubx_checksum;
use super::{Decoded, Marker, ProtocolDecoder};
use crate::message::{DecodedMessage, ProtocolTag};

const SYNC: [u8; 2] = [0xB5, 0x62];
const HEADER_LEN: usize = 6;

/// `(class, id, name)` for the messages commonly seen on receiver links.
const IDENTITIES: &[(u8, u8, &str)] = &[
    (0x01, 0x02, "NAV-POSLLH"),
    (0x01, 0x03, "NAV-STATUS"),
    (0x01, 0x04, "NAV-DOP"),
    (0x01, 0x07, "NAV-PVT"),
    (0x01, 0x12, "NAV-VELNED"),
    (0x01, 0x14, "NAV-HPPOSLLH"),
    (0x01, 0x20, "NAV-TIMEGPS"),
    (0x01, 0x21, "NAV-TIMEUTC"),
    (0x01, 0x35, "NAV-SAT"),
    (0x01, 0x3B, "NAV-SVIN"),
    (0x01, 0x3C, "NAV-RELPOSNED"),
    (0x01, 0x43, "NAV-SIG"),
    (0x02, 0x13, "RXM-SFRBX"),
    (0x02, 0x15, "RXM-RAWX"),
    (0x02, 0x32, "RXM-RTCM"),
    (0x02, 0x33, "RXM-SPARTN"),
    (0x02, 0x34, "RXM-COR"),
    (0x02, 0x72, "RXM-PMP"),
    (0x04, 0x00, "INF-ERROR"),
    (0x04, 0x01, "INF-WARNING"),
    (0x04, 0x02, "INF-NOTICE"),
    (0x05, 0x00, "ACK-NAK"),
    (0x05, 0x01, "ACK-ACK"),
    (0x06, 0x00, "CFG-PRT"),
    (0x06, 0x01, "CFG-MSG"),
    (0x06, 0x08, "CFG-RATE"),
    (0x06, 0x8A, "CFG-VALSET"),
    (0x06, 0x8B, "CFG-VALGET"),
    (0x06, 0x8C, "CFG-VALDEL"),
    (0x0A, 0x04, "MON-VER"),
    (0x0A, 0x09, "MON-HW"),
    (0x0A, 0x38, "MON-RF"),
    (0x0D, 0x01, "TIM-TP"),
    (0x10, 0x02, "ESF-MEAS"),
    (0x10, 0x10, "ESF-STATUS"),
    (0x10, 0x15, "ESF-INS"),
];

/// `B5 62 class id len payload ckA ckB` frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct UbxDecoder;

impl UbxDecoder {
    /// Identity for a class/id pair, e.g. `NAV-PVT` or `UBX-F5-01` if unknown.
    pub fn identity(class: u8, id: u8) -> String {
        IDENTITIES
            .iter()
            .find(|(c, i, _)| *c == class && *i == id)
            .map(|(_, _, name)| (*name).to_string())
            .unwrap_or_else(|| format!("UBX-{class:02X}-{id:02X}"))
    }
}

impl ProtocolDecoder for UbxDecoder {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Ubx
    }

    fn marker(&self, buf: &[u8]) -> Marker {
        match buf {
            [0xB5] => Marker::Undecided,
            [a, b, ..] if [*a, *b] == SYNC => Marker::Match,
            _ => Marker::NoMatch,
        }
    }

    fn decode(&self, buf: &[u8], validate: bool) -> Decoded {
        if buf.len() < HEADER_LEN {
            return Decoded::NeedMore;
        }
        let length = usize::from(u16::from_le_bytes([buf[4], buf[5]]));
        let total = HEADER_LEN + length + 2;
        if buf.len() < total {
            return Decoded::NeedMore;
        }

        if validate {
            let expected = (buf[total - 2], buf[total - 1]);
            let actual = ubx_checksum(&buf[2..HEADER_LEN + length]);
            if expected != actual {
                return Decoded::Malformed {
                    protocol: ProtocolTag::Ubx,
                    reason: format!(
                        "checksum mismatch: expected {:02x}{:02x}, computed {:02x}{:02x}",
                        expected.0, expected.1, actual.0, actual.1
                    ),
                };
            }
        }

        let (class, id) = (buf[2], buf[3]);
        let payload = &buf[HEADER_LEN..HEADER_LEN + length];
        let message = DecodedMessage::new(
            ProtocolTag::Ubx,
            Self::identity(class, id),
            buf[..total].to_vec(),
        );
        Decoded::Message {
            message: decode_payload(message, class, id, payload),
            consumed: total,
        }
    }
}

fn u16_at(p: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(p.get(at..at + 2)?.try_into().ok()?))
}

fn u32_at(p: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(p.get(at..at + 4)?.try_into().ok()?))
}

fn i32_at(p: &[u8], at: usize) -> Option<i32> {
    Some(i32::from_le_bytes(p.get(at..at + 4)?.try_into().ok()?))
}

fn decode_payload(mut message: DecodedMessage, class: u8, id: u8, payload: &[u8]) -> DecodedMessage {
    let fields = &mut message.fields;
    match (class, id) {
        (0x01, 0x07) if payload.len() >= 92 => {
            fields.insert("iTOW".into(), Value::from(u32_at(payload, 0)));
            fields.insert("year".into(), Value::from(u16_at(payload, 4)));
            fields.insert("month".into(), Value::from(payload[6]));
            fields.insert("day".into(), Value::from(payload[7]));
            fields.insert("hour".into(), Value::from(payload[8]));
            fields.insert("min".into(), Value::from(payload[9]));
            fields.insert("second".into(), Value::from(payload[10]));
            fields.insert("fixType".into(), Value::from(payload[20]));
            fields.insert("carrSoln".into(), Value::from(payload[21] >> 6));
            fields.insert("numSV".into(), Value::from(payload[23]));
            insert_scaled(fields, "lon", i32_at(payload, 24), 1e-7);
            insert_scaled(fields, "lat", i32_at(payload, 28), 1e-7);
            insert_scaled(fields, "height", i32_at(payload, 32), 1e-3);
            insert_scaled(fields, "hMSL", i32_at(payload, 36), 1e-3);
            insert_scaled(fields, "hAcc", u32_at(payload, 40).map(f64::from), 1e-3);
            insert_scaled(fields, "pDOP", u16_at(payload, 76).map(f64::from), 0.01);
        }
        (0x01, 0x02) if payload.len() >= 28 => {
            fields.insert("iTOW".into(), Value::from(u32_at(payload, 0)));
            insert_scaled(fields, "lon", i32_at(payload, 4), 1e-7);
            insert_scaled(fields, "lat", i32_at(payload, 8), 1e-7);
            insert_scaled(fields, "height", i32_at(payload, 12), 1e-3);
            insert_scaled(fields, "hMSL", i32_at(payload, 16), 1e-3);
            insert_scaled(fields, "hAcc", u32_at(payload, 20).map(f64::from), 1e-3);
        }
        (0x05, _) if payload.len() >= 2 => {
            fields.insert("clsID".into(), Value::from(payload[0]));
            fields.insert("msgID".into(), Value::from(payload[1]));
        }
        _ => {
            fields.insert("length".into(), Value::from(payload.len()));
        }
    }
    message
}

fn insert_scaled(
    fields: &mut serde_json::Map<String, Value>,
    name: &str,
    raw: Option<impl Into<f64>>,
    scale: f64,
) {
    if let Some(raw) = raw {
        fields.insert(name.to_string(), Value::from(raw.into() * scale));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::samples::UBX_CFG_VALGET;

    /// Build a NAV-PVT frame at the given position.
    fn nav_pvt(lat: f64, lon: f64, fix_type: u8, num_sv: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 92];
        payload[0..4].copy_from_slice(&1000u32.to_le_bytes());
        payload[20] = fix_type;
        payload[23] = num_sv;
        payload[24..28].copy_from_slice(&((lon * 1e7).round() as i32).to_le_bytes());
        payload[28..32].copy_from_slice(&((lat * 1e7).round() as i32).to_le_bytes());
        payload[32..36].copy_from_slice(&125_000i32.to_le_bytes());
        payload[36..40].copy_from_slice(&80_000i32.to_le_bytes());
        let mut frame = vec![0xB5, 0x62, 0x01, 0x07];
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&payload);
        let (a, b) = ubx_checksum(&frame[2..]);
        frame.extend_from_slice(&[a, b]);
        frame
    }

    #[test]
    fn identity_lookup() {
        assert_eq!(UbxDecoder::identity(0x01, 0x07), "NAV-PVT");
        assert_eq!(UbxDecoder::identity(0xF5, 0x01), "UBX-F5-01");
    }

    #[test]
    fn decodes_valget() {
        let Decoded::Message { message, consumed } = UbxDecoder.decode(UBX_CFG_VALGET, true) else {
            panic!("expected message");
        };
        assert_eq!(consumed, UBX_CFG_VALGET.len());
        assert_eq!(message.identity, "CFG-VALGET");
        assert_eq!(message.fields["length"], 12);
    }

    #[test]
    fn decodes_nav_pvt_position() {
        let frame = nav_pvt(51.5, -0.12, 3, 14);
        let Decoded::Message { message, .. } = UbxDecoder.decode(&frame, true) else {
            panic!("expected message");
        };
        assert_eq!(message.identity, "NAV-PVT");
        assert!((message.field_f64("lat").unwrap() - 51.5).abs() < 1e-6);
        assert!((message.field_f64("lon").unwrap() + 0.12).abs() < 1e-6);
        assert!((message.field_f64("hMSL").unwrap() - 80.0).abs() < 1e-9);
        assert_eq!(message.field_f64("numSV"), Some(14.0));
    }

    #[test]
    fn truncated_frame_needs_more() {
        assert_eq!(UbxDecoder.decode(&UBX_CFG_VALGET[..8], true), Decoded::NeedMore);
    }
}
