use serde_json::Value;

use super::bits::BitReader;
use super::checksum::crc24q;
use super::{Decoded, Marker, ProtocolDecoder};
use crate::message::{DecodedMessage, ProtocolTag};

const PREAMBLE: u8 = 0xD3;
const HEADER_LEN: usize = 3;
const CRC_LEN: usize = 3;

/// RTCM 3 transport frames: `D3`, 6 reserved bits, 10-bit length, payload, CRC-24Q.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcmDecoder;

impl ProtocolDecoder for RtcmDecoder {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Rtcm3
    }

    fn marker(&self, buf: &[u8]) -> Marker {
        match buf {
            [PREAMBLE] => Marker::Undecided,
            [PREAMBLE, second, ..] if second & 0xFC == 0 => Marker::Match,
            _ => Marker::NoMatch,
        }
    }

    fn decode(&self, buf: &[u8], validate: bool) -> Decoded {
        if buf.len() < HEADER_LEN {
            return Decoded::NeedMore;
        }
        let length = (usize::from(buf[1] & 0x03) << 8) | usize::from(buf[2]);
        let total = HEADER_LEN + length + CRC_LEN;
        if buf.len() < total {
            return Decoded::NeedMore;
        }

        if validate {
            let body_end = HEADER_LEN + length;
            let expected = (u32::from(buf[body_end]) << 16)
                | (u32::from(buf[body_end + 1]) << 8)
                | u32::from(buf[body_end + 2]);
            let actual = crc24q(&buf[..body_end]);
            if expected != actual {
                return Decoded::Malformed {
                    protocol: ProtocolTag::Rtcm3,
                    reason: format!("CRC mismatch: expected {expected:06x}, computed {actual:06x}"),
                };
            }
        }

        let payload = &buf[HEADER_LEN..HEADER_LEN + length];
        let mut reader = BitReader::new(payload);
        let Some(message_type) = reader.read(12) else {
            return Decoded::Malformed {
                protocol: ProtocolTag::Rtcm3,
                reason: "payload too short for message type".to_string(),
            };
        };

        let mut message = DecodedMessage::new(
            ProtocolTag::Rtcm3,
            message_type.to_string(),
            buf[..total].to_vec(),
        )
        .with_field("DF002", message_type);
        if let Some(station) = reader.read(12) {
            message.fields.insert("DF003".into(), Value::from(station));
        }
        message.fields.insert("length".into(), Value::from(length));

        Decoded::Message {
            message,
            consumed: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::samples::{RTCM_1005, RTCM_1065};

    #[test]
    fn decodes_station_message() {
        let Decoded::Message { message, consumed } = RtcmDecoder.decode(RTCM_1005, true) else {
            panic!("expected message");
        };
        assert_eq!(consumed, RTCM_1005.len());
        assert_eq!(message.identity, "1005");
        assert_eq!(message.fields["DF003"], 2003);
    }

    #[test]
    fn decodes_ssr_message() {
        let Decoded::Message { message, .. } = RtcmDecoder.decode(RTCM_1065, true) else {
            panic!("expected message");
        };
        assert_eq!(message.identity, "1065");
    }

    #[test]
    fn reserved_bits_reject_marker() {
        assert_eq!(RtcmDecoder.marker(&[0xD3, 0x04]), Marker::NoMatch);
        assert_eq!(RtcmDecoder.marker(&[0xD3]), Marker::Undecided);
    }

    #[test]
    fn crc_failure_is_malformed() {
        let mut frame = RTCM_1065.to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(matches!(
            RtcmDecoder.decode(&frame, true),
            Decoded::Malformed { .. }
        ));
    }
}
