//! Frame checksums used by the supported wire protocols.

/// XOR of all bytes between `$` and `*` of an NMEA sentence.
pub fn nmea_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// 8-bit Fletcher checksum over UBX class, id, length and payload.
pub fn ubx_checksum(data: &[u8]) -> (u8, u8) {
    data.iter().fold((0u8, 0u8), |(a, b), &byte| {
        let a = a.wrapping_add(byte);
        (a, b.wrapping_add(a))
    })
}

/// CRC-24Q as used by RTCM 3 transport frames.
pub fn crc24q(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= 0x0186_4CFB;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// CRC-16 CCITT (XModem variant) as used by SBF blocks.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmea_known_sentence() {
        assert_eq!(nmea_checksum(b"GNDTM,W84,,0.0,N,0.0,E,0.0,W84"), 0x71);
    }

    #[test]
    fn crc16_check_value() {
        // Standard XModem check value for "123456789".
        assert_eq!(crc16_ccitt(b"123456789"), 0x31C3);
    }

    #[test]
    fn crc24q_check_value() {
        // Standard CRC-24Q check value for "123456789".
        assert_eq!(crc24q(b"123456789"), 0xCDE703);
    }

    #[test]
    fn ubx_checksum_cfg_valget() {
        let frame = [
            0x06, 0x8b, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68, 0x00, 0x11, 0x40, 0xb6, 0xf3,
            0x9d, 0x3f,
        ];
        assert_eq!(ubx_checksum(&frame), (0xdb, 0x3d));
    }
}
