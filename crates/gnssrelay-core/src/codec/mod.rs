//! Framing codecs for the GNSS wire protocols multiplexed on one stream.
//!
//! A [`MessageCodec`] looks at the head of a byte buffer and either yields the
//! next complete message, asks for more bytes, reports a malformed frame, or
//! asks the caller to discard leading bytes that no enabled protocol
//! recognizes.
//!
//! [`GnssCodec`] combines one [`ProtocolDecoder`] per protocol. Decoders are
//! selected from a [`ProtocolMask`] when the codec is built:
//!
//! - NMEA and RTCM3 are always framed.
//! - SPARTN is framed when its bit is set.
//! - Exactly one of UBX or SBF is framed. UBX wins when both bits are set
//!   (or neither is); SBF blocks are then skipped as unrecognized bytes.

mod bits;
pub mod checksum;
mod nmea;
mod rtcm;
mod sbf;
mod spartn;
mod ubx;

use crate::message::{DecodedMessage, ProtocolMask, ProtocolTag};

pub use nmea::NmeaDecoder;
pub use rtcm::RtcmDecoder;
pub use sbf::SbfDecoder;
pub use spartn::SpartnDecoder;
pub use ubx::UbxDecoder;

/// Outcome of a single decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete frame at the head of the buffer.
    Message {
        message: DecodedMessage,
        consumed: usize,
    },
    /// The buffer holds a frame prefix; read more bytes.
    NeedMore,
    /// A start marker was found but the frame is corrupt.
    Malformed { protocol: ProtocolTag, reason: String },
    /// Leading bytes that do not start any enabled protocol.
    Skip(usize),
}

/// Parses the next message from the head of a buffer.
pub trait MessageCodec: Send {
    fn decode(&mut self, buf: &[u8]) -> Decoded;
}

/// Result of checking whether a buffer starts with a protocol's marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Match,
    NoMatch,
    /// Too few bytes to tell.
    Undecided,
}

/// Framing for one wire protocol.
pub trait ProtocolDecoder: Send + Sync {
    fn protocol(&self) -> ProtocolTag;

    fn marker(&self, buf: &[u8]) -> Marker;

    /// Decode a frame from a buffer whose head matched [`Self::marker`].
    fn decode(&self, buf: &[u8], validate: bool) -> Decoded;
}

/// Multi-protocol codec over the enabled decoders.
pub struct GnssCodec {
    decoders: Vec<Box<dyn ProtocolDecoder>>,
    validate: bool,
}

impl GnssCodec {
    /// Build the decoder set for a protocol mask.
    pub fn new(mask: ProtocolMask) -> Self {
        let mut decoders: Vec<Box<dyn ProtocolDecoder>> = Vec::new();
        if mask.contains(ProtocolMask::SBF) && !mask.contains(ProtocolMask::UBX) {
            decoders.push(Box::new(SbfDecoder));
        } else {
            decoders.push(Box::new(UbxDecoder));
        }
        decoders.push(Box::new(NmeaDecoder));
        decoders.push(Box::new(RtcmDecoder));
        if mask.contains(ProtocolMask::SPARTN) {
            decoders.push(Box::new(SpartnDecoder));
        }
        Self {
            decoders,
            validate: true,
        }
    }

    /// Codec for an NTRIP correction stream carrying RTCM3 or SPARTN only.
    pub fn corrections(protocol: ProtocolTag) -> Self {
        let decoder: Box<dyn ProtocolDecoder> = match protocol {
            ProtocolTag::Spartn => Box::new(SpartnDecoder),
            _ => Box::new(RtcmDecoder),
        };
        Self {
            decoders: vec![decoder],
            validate: true,
        }
    }

    /// Enable or disable checksum validation.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Protocols this codec frames, in match order.
    pub fn protocols(&self) -> Vec<ProtocolTag> {
        self.decoders.iter().map(|d| d.protocol()).collect()
    }

    fn could_start(&self, buf: &[u8]) -> bool {
        self.decoders
            .iter()
            .any(|d| d.marker(buf) != Marker::NoMatch)
    }
}

impl MessageCodec for GnssCodec {
    fn decode(&mut self, buf: &[u8]) -> Decoded {
        if buf.is_empty() {
            return Decoded::NeedMore;
        }

        let mut undecided = false;
        for decoder in &self.decoders {
            match decoder.marker(buf) {
                Marker::Match => return decoder.decode(buf, self.validate),
                Marker::Undecided => undecided = true,
                Marker::NoMatch => {}
            }
        }
        if undecided {
            return Decoded::NeedMore;
        }

        let skip = (1..buf.len())
            .find(|&i| self.could_start(&buf[i..]))
            .unwrap_or(buf.len());
        Decoded::Skip(skip)
    }
}

impl std::fmt::Debug for GnssCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GnssCodec")
            .field("protocols", &self.protocols())
            .field("validate", &self.validate)
            .finish()
    }
}
