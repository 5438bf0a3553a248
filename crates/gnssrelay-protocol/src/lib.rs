//! NTRIP wire format shared by the client and the caster.
//!
//! # Overview
//!
//! NTRIP is HTTP-shaped. A client sends a `GET /<mountpoint>` with Basic
//! credentials and, optionally, its position as a GGA sentence. The caster
//! answers with either:
//!
//! - a sourcetable (`SOURCETABLE 200 OK` for v1, `Content-Type:
//!   gnss/sourcetable` for v2) listing the available mountpoints, or
//! - a raw correction stream (`ICY 200 OK` for v1, `Content-Type: gnss/data`
//!   and usually chunked transfer for v2).
//!
//! # Example
//!
//! ```rust
//! use gnssrelay_protocol::{ClientRequest, Credentials, NtripVersion};
//!
//! let request = ClientRequest::new("caster.example.com", 2101, "MP1")
//!     .with_version(NtripVersion::V2)
//!     .with_credentials(Some(Credentials::new("anon", "password")));
//! let bytes = request.to_bytes();
//! assert!(bytes.starts_with(b"GET /MP1 HTTP/1.1\r\n"));
//! ```

mod auth;
mod chunked;
mod error;
mod gga;
pub mod head;
mod request;
mod response;
mod sourcetable;

pub use auth::Credentials;
pub use chunked::ChunkedDecoder;
pub use error::{ProtocolError, ProtocolResult};
pub use gga::{DEFAULT_HDOP, DEFAULT_SATELLITES, FixType, GgaPosition};
pub use head::{Headers, MAX_HEAD_SIZE, check_head, head_length};
pub use request::{CasterRequest, ClientRequest, NtripVersion, USER_AGENT};
pub use response::{
    BodyKind, ResponseHead, SERVER_NAME, Status, error_response, sourcetable_response,
    stream_response,
};
pub use sourcetable::{NearestMountpoint, SourceTable, SourceTableEntry};

/// Default caster port.
pub const DEFAULT_PORT: u16 = 2101;
