//! GGA sentences reported upstream to casters that need the rover position.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use gnssrelay_core::codec::checksum::nmea_checksum;
use gnssrelay_core::geo::degrees_to_dmm;

/// Satellites in use when the position source does not say.
pub const DEFAULT_SATELLITES: u8 = 15;
/// HDOP when the position source does not say.
pub const DEFAULT_HDOP: f64 = 0.98;

/// Fix type as reported by a receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixType {
    NoFix,
    #[serde(rename = "2D")]
    TwoD,
    #[default]
    #[serde(rename = "3D")]
    ThreeD,
    RtkFixed,
    RtkFloat,
    DeadReckoning,
}

impl FixType {
    /// GGA quality indicator.
    pub fn quality(&self) -> u8 {
        match self {
            Self::NoFix => 0,
            Self::ThreeD => 1,
            Self::TwoD => 2,
            Self::RtkFixed => 4,
            Self::RtkFloat => 5,
            Self::DeadReckoning => 6,
        }
    }

    /// Inverse of [`FixType::quality`]; DGPS (2) maps to 2D.
    pub fn from_quality(quality: u8) -> Self {
        match quality {
            0 => Self::NoFix,
            2 | 3 => Self::TwoD,
            4 => Self::RtkFixed,
            5 => Self::RtkFloat,
            6 => Self::DeadReckoning,
            _ => Self::ThreeD,
        }
    }
}

impl FromStr for FixType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO FIX" | "NOFIX" | "NONE" => Ok(Self::NoFix),
            "2D" => Ok(Self::TwoD),
            "3D" => Ok(Self::ThreeD),
            "RTK FIXED" | "RTK_FIXED" => Ok(Self::RtkFixed),
            "RTK FLOAT" | "RTK_FLOAT" => Ok(Self::RtkFloat),
            "DR" => Ok(Self::DeadReckoning),
            other => Err(format!("unknown fix type '{other}'")),
        }
    }
}

impl fmt::Display for FixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoFix => "NO FIX",
            Self::TwoD => "2D",
            Self::ThreeD => "3D",
            Self::RtkFixed => "RTK FIXED",
            Self::RtkFloat => "RTK FLOAT",
            Self::DeadReckoning => "DR",
        })
    }
}

/// A position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgaPosition {
    pub lat: f64,
    pub lon: f64,
    /// Metres above mean sea level.
    pub alt: f64,
    /// Geoid separation in metres.
    pub sep: f64,
    pub fix: FixType,
    pub satellites: u8,
    pub hdop: f64,
    pub diff_age: Option<f64>,
    pub diff_station: Option<u16>,
}

impl GgaPosition {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            alt: 0.0,
            sep: 0.0,
            fix: FixType::default(),
            satellites: DEFAULT_SATELLITES,
            hdop: DEFAULT_HDOP,
            diff_age: None,
            diff_station: None,
        }
    }

    #[must_use]
    pub fn with_height(mut self, alt: f64, sep: f64) -> Self {
        self.alt = alt;
        self.sep = sep;
        self
    }

    #[must_use]
    pub fn with_fix(mut self, fix: FixType) -> Self {
        self.fix = fix;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, satellites: u8, hdop: f64) -> Self {
        self.satellites = satellites;
        self.hdop = hdop;
        self
    }

    /// `$GPGGA` sentence for `now`, CRLF terminated.
    pub fn to_sentence(&self, now: DateTime<Utc>) -> String {
        let (lat, ns) = degrees_to_dmm(self.lat, true);
        let (lon, ew) = degrees_to_dmm(self.lon, false);
        let centis = now.nanosecond().min(999_999_999) / 10_000_000;
        let body = format!(
            "GPGGA,{:02}{:02}{:02}.{:02},{lat},{ns},{lon},{ew},{},{:02},{},{},M,{},M,{},{}",
            now.hour(),
            now.minute(),
            now.second(),
            centis,
            self.fix.quality(),
            self.satellites,
            trim_float(self.hdop),
            trim_float(self.alt),
            trim_float(self.sep),
            self.diff_age.map(trim_float).unwrap_or_default(),
            self.diff_station.map(|s| s.to_string()).unwrap_or_default(),
        );
        format!("${body}*{:02X}\r\n", nmea_checksum(body.as_bytes()))
    }
}

/// Up to three decimals, trailing zeros removed.
fn trim_float(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gnssrelay_core::{Decoded, GnssCodec, MessageCodec, ProtocolMask};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 12, 35, 19).unwrap()
    }

    #[test]
    fn formats_sentence() {
        let position = GgaPosition::new(-48.1173, 11.516_666_666_7)
            .with_height(545.4, 46.9)
            .with_fix(FixType::TwoD)
            .with_quality(8, 0.9);
        let sentence = position.to_sentence(now());
        assert!(sentence.starts_with(
            "$GPGGA,123519.00,4807.03800,S,01131.00000,E,2,08,0.9,545.4,M,46.9,M,,*"
        ));
        assert!(sentence.ends_with("\r\n"));
    }

    #[test]
    fn sentence_decodes_with_valid_checksum() {
        let sentence = GgaPosition::new(37.23, -115.81).to_sentence(now());
        let mut codec = GnssCodec::new(ProtocolMask::NMEA);
        match codec.decode(sentence.as_bytes()) {
            Decoded::Message { message, consumed } => {
                assert_eq!(consumed, sentence.len());
                assert_eq!(message.identity, "GPGGA");
                assert_eq!(message.field_f64("quality"), Some(1.0));
                assert_eq!(message.field_f64("numSV"), Some(15.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fix_quality_map() {
        let cases = [
            ("3D", 1),
            ("2D", 2),
            ("RTK FIXED", 4),
            ("RTK FLOAT", 5),
            ("DR", 6),
            ("NO FIX", 0),
        ];
        for (name, quality) in cases {
            let fix: FixType = name.parse().unwrap();
            assert_eq!(fix.quality(), quality, "{name}");
            assert_eq!(FixType::from_quality(quality), fix);
            assert_eq!(fix.to_string(), name);
        }
        assert!("4D".parse::<FixType>().is_err());
    }

    #[test]
    fn trims_floats() {
        assert_eq!(trim_float(0.98), "0.98");
        assert_eq!(trim_float(545.0), "545");
        assert_eq!(trim_float(-0.0001), "0");
    }
}
