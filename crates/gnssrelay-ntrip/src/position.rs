//! Where the rover position for GGA feedback and nearest-mountpoint lookup
//! comes from.

use std::sync::{Arc, PoisonError, RwLock};

use gnssrelay_core::DecodedMessage;
use gnssrelay_core::ProtocolTag;
use gnssrelay_protocol::{FixType, GgaPosition};

/// Supplies the current position, if known.
pub trait PositionSource: Send + Sync {
    fn position(&self) -> Option<GgaPosition>;
}

/// A configured reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPosition(pub GgaPosition);

impl PositionSource for FixedPosition {
    fn position(&self) -> Option<GgaPosition> {
        Some(self.0.clone())
    }
}

/// Position shared between a receiver stream and its consumers.
///
/// The dispatcher feeds decoded GGA and NAV-PVT messages in through
/// [`LivePosition::observe`]; the NTRIP client and the caster read it.
#[derive(Debug, Clone, Default)]
pub struct LivePosition {
    inner: Arc<RwLock<Option<GgaPosition>>>,
}

impl LivePosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, position: GgaPosition) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(position);
    }

    /// Update from a decoded message; returns true if it carried a position.
    pub fn observe(&self, message: &DecodedMessage) -> bool {
        match position_from_message(message) {
            Some(position) => {
                self.set(position);
                true
            }
            None => false,
        }
    }
}

impl PositionSource for LivePosition {
    fn position(&self) -> Option<GgaPosition> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn position_from_message(message: &DecodedMessage) -> Option<GgaPosition> {
    match message.protocol {
        ProtocolTag::Nmea if message.identity.ends_with("GGA") => {
            let quality = message.field_f64("quality").unwrap_or(1.0);
            let mut position = GgaPosition::new(message.field_f64("lat")?, message.field_f64("lon")?)
                .with_height(
                    message.field_f64("alt").unwrap_or_default(),
                    message.field_f64("sep").unwrap_or_default(),
                )
                .with_fix(FixType::from_quality(quality as u8));
            if let Some(satellites) = message.field_f64("numSV") {
                position.satellites = satellites as u8;
            }
            if let Some(hdop) = message.field_f64("HDOP") {
                position.hdop = hdop;
            }
            Some(position)
        }
        ProtocolTag::Ubx if message.identity == "NAV-PVT" => {
            let fix_type = message.field_f64("fixType").unwrap_or_default() as u8;
            let carrier = message.field_f64("carrSoln").unwrap_or_default() as u8;
            let fix = match (fix_type, carrier) {
                (0 | 5, _) => FixType::NoFix,
                (1, _) => FixType::DeadReckoning,
                (2, _) => FixType::TwoD,
                (_, 2) => FixType::RtkFixed,
                (_, 1) => FixType::RtkFloat,
                _ => FixType::ThreeD,
            };
            let height = message.field_f64("height").unwrap_or_default();
            let msl = message.field_f64("hMSL").unwrap_or(height);
            let mut position = GgaPosition::new(message.field_f64("lat")?, message.field_f64("lon")?)
                .with_height(msl, height - msl)
                .with_fix(fix);
            if let Some(satellites) = message.field_f64("numSV") {
                position.satellites = satellites as u8;
            }
            Some(position)
        }
        _ => None,
    }
}
