use serde_json::Value;

use super::checksum::crc16_ccitt;
use super::{Decoded, Marker, ProtocolDecoder};
use crate::message::{DecodedMessage, ProtocolTag};

const HEADER_LEN: usize = 8;
/// Septentrio "do not use" marker for floating point fields.
const DNU_F64: f64 = -2e10;

const BLOCKS: &[(u16, &str)] = &[
    (4001, "DOP"),
    (4006, "PVTCartesian"),
    (4007, "PVTGeodetic"),
    (4013, "ChannelStatus"),
    (4027, "MeasEpoch"),
    (4043, "BaseVectorCart"),
    (4044, "PosCovGeodetic"),
    (4012, "SatVisibility"),
    (4090, "InputLink"),
    (4059, "DiffCorrIn"),
    (5902, "ReceiverSetup"),
    (5914, "ReceiverTime"),
];

/// Septentrio binary blocks: `$@`, CRC, ID, length, body.
#[derive(Debug, Default, Clone, Copy)]
pub struct SbfDecoder;

impl SbfDecoder {
    pub fn identity(block: u16) -> String {
        BLOCKS
            .iter()
            .find(|(number, _)| *number == block)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| format!("SBF-{block}"))
    }
}

impl ProtocolDecoder for SbfDecoder {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Sbf
    }

    fn marker(&self, buf: &[u8]) -> Marker {
        match buf {
            [b'$'] => Marker::Undecided,
            [b'$', b'@', ..] => Marker::Match,
            _ => Marker::NoMatch,
        }
    }

    fn decode(&self, buf: &[u8], validate: bool) -> Decoded {
        if buf.len() < HEADER_LEN {
            return Decoded::NeedMore;
        }
        let crc = u16::from_le_bytes([buf[2], buf[3]]);
        let id = u16::from_le_bytes([buf[4], buf[5]]);
        let length = usize::from(u16::from_le_bytes([buf[6], buf[7]]));
        if length < HEADER_LEN || length % 4 != 0 {
            return Decoded::Malformed {
                protocol: ProtocolTag::Sbf,
                reason: format!("invalid block length {length}"),
            };
        }
        if buf.len() < length {
            return Decoded::NeedMore;
        }
        if validate {
            let actual = crc16_ccitt(&buf[4..length]);
            if actual != crc {
                return Decoded::Malformed {
                    protocol: ProtocolTag::Sbf,
                    reason: format!("CRC mismatch: expected {crc:04x}, computed {actual:04x}"),
                };
            }
        }

        let block = id & 0x1FFF;
        let body = &buf[..length];
        let mut message = DecodedMessage::new(ProtocolTag::Sbf, Self::identity(block), body.to_vec())
            .with_field("revision", id >> 13);
        if length >= 14 {
            let tow = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
            let wnc = u16::from_le_bytes([body[12], body[13]]);
            message.fields.insert("TOW".into(), Value::from(tow));
            message.fields.insert("WNc".into(), Value::from(wnc));
        }
        if block == 4007 && length >= 76 {
            decode_pvt_geodetic(&mut message, body);
        }

        Decoded::Message {
            message,
            consumed: length,
        }
    }
}

fn f64_at(body: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&body[at..at + 8]);
    f64::from_le_bytes(raw)
}

fn decode_pvt_geodetic(message: &mut DecodedMessage, body: &[u8]) {
    message.fields.insert("Mode".into(), Value::from(body[14]));
    message.fields.insert("Error".into(), Value::from(body[15]));
    let lat = f64_at(body, 16);
    let lon = f64_at(body, 24);
    let height = f64_at(body, 32);
    if lat != DNU_F64 && lon != DNU_F64 {
        message.fields.insert("lat".into(), Value::from(lat.to_degrees()));
        message.fields.insert("lon".into(), Value::from(lon.to_degrees()));
    }
    if height != DNU_F64 {
        message.fields.insert("height".into(), Value::from(height));
    }
    message.fields.insert("NrSV".into(), Value::from(body[74]));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: u16, body: &[u8]) -> Vec<u8> {
        let length = HEADER_LEN + body.len();
        let mut frame = vec![b'$', b'@', 0, 0];
        frame.extend_from_slice(&id.to_le_bytes());
        frame.extend_from_slice(&(length as u16).to_le_bytes());
        frame.extend_from_slice(body);
        let crc = crc16_ccitt(&frame[4..]);
        frame[2..4].copy_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn decodes_receiver_time() {
        let mut body = vec![0u8; 16];
        body[0..4].copy_from_slice(&345_600_000u32.to_le_bytes());
        body[4..6].copy_from_slice(&2300u16.to_le_bytes());
        let frame = block(5914 | (1 << 13), &body);

        let Decoded::Message { message, consumed } = SbfDecoder.decode(&frame, true) else {
            panic!("expected message");
        };
        assert_eq!(consumed, frame.len());
        assert_eq!(message.identity, "ReceiverTime");
        assert_eq!(message.fields["revision"], 1);
        assert_eq!(message.fields["WNc"], 2300);
    }

    #[test]
    fn rejects_unaligned_length() {
        let mut frame = block(4007, &[0u8; 8]);
        frame[6] = 10;
        assert!(matches!(
            SbfDecoder.decode(&frame, true),
            Decoded::Malformed { .. }
        ));
    }

    #[test]
    fn unknown_block_identity() {
        assert_eq!(SbfDecoder::identity(4999), "SBF-4999");
    }
}
