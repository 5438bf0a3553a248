//! Core types: decoded messages, framing codecs, filters, output formatting

pub mod codec;
pub mod error;
pub mod filter;
pub mod format;
pub mod geo;
pub mod message;
pub mod tracing;

pub use codec::{Decoded, GnssCodec, MessageCodec};
pub use error::{CoreError, CoreResult};
pub use filter::{FilterSpec, IdentityRule, MessageFilter, parse_identity_filter};
pub use format::{FormatSpec, Formatter, OutputEvent, Representation, hextable};
pub use geo::haversine;
pub use message::{DecodedMessage, ProtocolMask, ProtocolTag, RawFrame};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, Verbosity, init_tracing};
