use serde_json::Value;

use super::bits::BitReader;
use super::{Decoded, Marker, ProtocolDecoder};
use crate::message::{DecodedMessage, ProtocolTag};

const PREAMBLE: u8 = 0x73;

/// SPARTN transport frames.
///
/// Frames are delimited from the header lengths; the payload CRC is carried
/// through but not verified.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpartnDecoder;

impl SpartnDecoder {
    /// Identity such as `SPARTN-1X-OCB-GPS` or `SPARTN-1X-GAD`.
    pub fn identity(message_type: u32, subtype: u32) -> Option<String> {
        const GNSS: [&str; 5] = ["GPS", "GLO", "GAL", "BEI", "QZS"];
        let name = match message_type {
            0 => format!("OCB-{}", GNSS.get(subtype as usize)?),
            1 => format!("HPAC-{}", GNSS.get(subtype as usize)?),
            2 => "GAD".to_string(),
            3 => "BPAC".to_string(),
            4 => match subtype {
                0 => "EAS-DYN".to_string(),
                1 => "EAS-GRP".to_string(),
                _ => return None,
            },
            120 => format!("PROP-{subtype}"),
            _ => return None,
        };
        Some(format!("SPARTN-1X-{name}"))
    }
}

struct Header {
    message_type: u32,
    subtype: u32,
    payload_len: usize,
    crc_len: usize,
    time_tag: u32,
    solution_id: u32,
    auth_len: usize,
    /// Bytes from the preamble through the end of the header fields.
    len: usize,
}

fn parse_header(buf: &[u8]) -> Option<Header> {
    let mut reader = BitReader::new(&buf[1..]);
    let message_type = reader.read(7)?;
    let payload_len = reader.read(10)? as usize;
    let eaf = reader.read(1)?;
    let crc_type = reader.read(2)?;
    let _frame_crc = reader.read(4)?;
    let subtype = reader.read(4)?;
    let time_tag_width = if reader.read(1)? == 1 { 32 } else { 16 };
    let time_tag = reader.read(time_tag_width)?;
    let solution_id = reader.read(7)?;
    let _processor_id = reader.read(4)?;
    let mut auth_len = 0;
    if eaf == 1 {
        let _encryption_id = reader.read(4)?;
        let _encryption_seq = reader.read(6)?;
        let auth_indicator = reader.read(3)?;
        let embedded_len = reader.read(3)?;
        if auth_indicator > 1 {
            auth_len = match embedded_len {
                0 => 8,
                1 => 12,
                2 => 16,
                3 => 32,
                4 => 64,
                _ => return None,
            };
        }
    }
    Some(Header {
        message_type,
        subtype,
        payload_len,
        crc_len: crc_type as usize + 1,
        time_tag,
        solution_id,
        auth_len,
        len: 1 + reader.position().div_ceil(8),
    })
}

impl ProtocolDecoder for SpartnDecoder {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Spartn
    }

    fn marker(&self, buf: &[u8]) -> Marker {
        match buf.first() {
            Some(&PREAMBLE) => Marker::Match,
            _ => Marker::NoMatch,
        }
    }

    fn decode(&self, buf: &[u8], _validate: bool) -> Decoded {
        // Longest header: preamble, 3 fixed bytes, 6 time-tag bytes, 2 encryption bytes.
        let Some(header) = parse_header(buf) else {
            if buf.len() < 12 {
                return Decoded::NeedMore;
            }
            return Decoded::Malformed {
                protocol: ProtocolTag::Spartn,
                reason: "invalid frame header".to_string(),
            };
        };
        let Some(identity) = Self::identity(header.message_type, header.subtype) else {
            return Decoded::Malformed {
                protocol: ProtocolTag::Spartn,
                reason: format!(
                    "unknown message type {}/{}",
                    header.message_type, header.subtype
                ),
            };
        };

        let total = header.len + header.payload_len + header.auth_len + header.crc_len;
        if buf.len() < total {
            return Decoded::NeedMore;
        }

        let message = DecodedMessage::new(ProtocolTag::Spartn, identity, buf[..total].to_vec())
            .with_field("msgType", header.message_type)
            .with_field("msgSubtype", header.subtype)
            .with_field("nData", Value::from(header.payload_len))
            .with_field("gnssTimeTag", header.time_tag)
            .with_field("solutionId", header.solution_id);
        Decoded::Message {
            message,
            consumed: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unencrypted frame with a 16-bit time tag and a 1-byte CRC.
    fn frame(message_type: u8, subtype: u8, payload: &[u8]) -> Vec<u8> {
        let n = payload.len() as u32;
        // msgType(7) nData(10) eaf(1) crcType(2) frameCrc(4)
        let word = (u32::from(message_type) << 17) | (n << 7);
        let mut out = vec![PREAMBLE];
        out.extend_from_slice(&word.to_be_bytes()[1..]);
        // subtype(4) timeTagType(1) timeTag(16) solutionId(7) processorId(4)
        let second: u32 = (u32::from(subtype) << 28) | (0x1234 << 11) | (5 << 4);
        out.extend_from_slice(&second.to_be_bytes());
        out.extend_from_slice(payload);
        out.push(0xAA);
        out
    }

    #[test]
    fn decodes_ocb_frame() {
        let data = frame(0, 2, &[1, 2, 3, 4]);
        let Decoded::Message { message, consumed } = SpartnDecoder.decode(&data, true) else {
            panic!("expected message");
        };
        assert_eq!(consumed, data.len());
        assert_eq!(message.identity, "SPARTN-1X-OCB-GAL");
        assert_eq!(message.fields["gnssTimeTag"], 0x1234);
        assert_eq!(message.fields["solutionId"], 5);
    }

    #[test]
    fn partial_frame_needs_more() {
        let data = frame(2, 0, &[0u8; 40]);
        assert_eq!(SpartnDecoder.decode(&data[..20], true), Decoded::NeedMore);
    }

    #[test]
    fn unknown_type_is_malformed() {
        let data = frame(99, 0, &[0u8; 4]);
        assert!(matches!(
            SpartnDecoder.decode(&data, true),
            Decoded::Malformed { .. }
        ));
    }
}
