//! NTRIP responses: parsing what a caster sends, building what our caster sends.

use chrono::{DateTime, Utc};

use crate::error::{ProtocolError, ProtocolResult};
use crate::head::{Headers, head_text};
use crate::request::NtripVersion;

/// `Server` header value for caster responses.
pub const SERVER_NAME: &str = concat!("gnssrelay_caster/", env!("CARGO_PKG_VERSION"));

/// Response statuses the caster produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::RequestTimeout => 408,
            Self::TooManyRequests => 429,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::TooManyRequests => "Too Many Requests",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// What the body following a response head contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Sourcetable,
    Stream,
    Unknown,
}

/// Parsed status line and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    /// `HTTP/1.1`, `HTTP/1.0`, `ICY` or `SOURCETABLE`.
    pub protocol: String,
    pub code: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn parse(head: &[u8]) -> ProtocolResult<Self> {
        let text = head_text(head)?;
        let mut lines = text.split("\r\n");
        let status = lines.next().unwrap_or_default().trim();
        let mut parts = status.splitn(3, ' ');
        let protocol = parts.next().unwrap_or_default();
        let code = parts
            .next()
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| ProtocolError::MalformedStatusLine(status.to_string()))?;
        let reason = parts.next().unwrap_or_default();
        if protocol.is_empty() {
            return Err(ProtocolError::MalformedStatusLine(status.to_string()));
        }

        Ok(Self {
            protocol: protocol.to_string(),
            code,
            reason: reason.to_string(),
            headers: Headers::parse(lines),
        })
    }

    pub fn is_success(&self) -> bool {
        self.code == 200
    }

    /// `Err(UnexpectedStatus)` unless the status is 200.
    pub fn ensure_success(&self) -> ProtocolResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedStatus {
                code: self.code,
                reason: self.reason.clone(),
            })
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn is_chunked(&self) -> bool {
        self.headers
            .get("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Classify the body using the status line, content type and, failing
    /// those, the first body bytes. Either protocol version's markers are
    /// accepted regardless of which version was requested.
    pub fn body_kind(&self, body_prefix: &[u8]) -> BodyKind {
        let content_type = self.content_type().unwrap_or_default().to_ascii_lowercase();
        if self.protocol == "SOURCETABLE" || content_type.contains("gnss/sourcetable") {
            return BodyKind::Sourcetable;
        }
        if self.protocol == "ICY" || content_type.contains("gnss/data") {
            return BodyKind::Stream;
        }
        let prefix = body_prefix.trim_ascii_start();
        if prefix.starts_with(b"STR;")
            || prefix.starts_with(b"CAS;")
            || prefix.starts_with(b"NET;")
            || crate::head::find(prefix, b"ENDSOURCETABLE").is_some()
        {
            return BodyKind::Sourcetable;
        }
        BodyKind::Unknown
    }
}

fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn status_block(status: Status, now: DateTime<Utc>) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nNtrip-Version: Ntrip/2.0\r\nNtrip-Flags: \r\nServer: {}\r\nDate: {}\r\n",
        status.code(),
        status.reason(),
        SERVER_NAME,
        http_date(now)
    )
}

/// Reply that switches the connection to relaying the data stream.
pub fn stream_response(version: NtripVersion, now: DateTime<Utc>) -> Vec<u8> {
    match version {
        NtripVersion::V1 => b"ICY 200 OK\r\n\r\n".to_vec(),
        NtripVersion::V2 => format!(
            "{}Cache-Control: no-store, no-cache, max-age=0\r\nPragma: no-cache\r\nConnection: close\r\nContent-Type: gnss/data\r\n\r\n",
            status_block(Status::Ok, now)
        )
        .into_bytes(),
    }
}

/// Error reply; 401 includes a `WWW-Authenticate` challenge for `realm`.
pub fn error_response(status: Status, realm: &str, now: DateTime<Utc>) -> Vec<u8> {
    let mut out = status_block(status, now);
    if status == Status::Unauthorized {
        out.push_str(&format!("WWW-Authenticate: Basic realm=\"{realm}\"\r\n"));
    }
    out.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");
    out.into_bytes()
}

/// Sourcetable reply carrying `body` (already terminated by `ENDSOURCETABLE`).
pub fn sourcetable_response(version: NtripVersion, body: &str, now: DateTime<Utc>) -> Vec<u8> {
    let head = match version {
        NtripVersion::V1 => format!(
            "SOURCETABLE 200 OK\r\nServer: {}\r\nDate: {}\r\nContent-Type: text/plain\r\n",
            SERVER_NAME,
            http_date(now)
        ),
        NtripVersion::V2 => format!(
            "{}Connection: close\r\nContent-Type: gnss/sourcetable\r\n",
            status_block(Status::Ok, now)
        ),
    };
    format!("{head}Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head::head_length;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 12, 30, 0).unwrap()
    }

    fn parse(raw: &[u8]) -> (ResponseHead, &[u8]) {
        let len = head_length(raw).unwrap();
        (ResponseHead::parse(&raw[..len]).unwrap(), &raw[len..])
    }

    #[test]
    fn parses_v2_stream_head() {
        let (head, body) = parse(
            b"HTTP/1.1 200 OK\r\nContent-Type: gnss/data\r\nTransfer-Encoding: chunked\r\n\r\n1a\r\n",
        );
        assert_eq!(head.code, 200);
        assert!(head.is_chunked());
        assert_eq!(head.body_kind(body), BodyKind::Stream);
    }

    #[test]
    fn parses_icy_head() {
        let (head, body) = parse(b"ICY 200 OK\r\n\xd3\x00\x13");
        assert_eq!(head.protocol, "ICY");
        assert_eq!(head.reason, "OK");
        assert_eq!(head.body_kind(body), BodyKind::Stream);
    }

    #[test]
    fn v1_sourcetable_to_v2_request() {
        let (head, body) = parse(b"SOURCETABLE 200 OK\r\nServer: x\r\n\r\nSTR;MP;");
        assert_eq!(head.body_kind(body), BodyKind::Sourcetable);
    }

    #[test]
    fn sourcetable_detected_from_body() {
        let (head, body) = parse(b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\n\r\nSTR;MP;x\r\nENDSOURCETABLE\r\n");
        assert_eq!(head.body_kind(body), BodyKind::Sourcetable);
        let (head, body) = parse(b"HTTP/1.0 200 OK\r\n\r\n\xd3\x00");
        assert_eq!(head.body_kind(body), BodyKind::Unknown);
    }

    #[test]
    fn error_status() {
        let (head, _) = parse(b"HTTP/1.1 401 Unauthorized\r\n\r\n");
        assert!(matches!(
            head.ensure_success(),
            Err(ProtocolError::UnexpectedStatus { code: 401, .. })
        ));
        assert!(ResponseHead::parse(b"HTTP/1.1 abc\r\n\r\n").is_err());
    }

    #[test]
    fn not_found_response() {
        let text = String::from_utf8(error_response(Status::NotFound, "mp", now())).unwrap();
        let expected = format!(
            "HTTP/1.1 404 Not Found\r\n\
             Ntrip-Version: Ntrip/2.0\r\n\
             Ntrip-Flags: \r\n\
             Server: {SERVER_NAME}\r\n\
             Date: Tue, 01 Oct 2024 12:30:00 GMT\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn unauthorized_response_has_challenge() {
        let text = String::from_utf8(error_response(Status::Unauthorized, "base", now())).unwrap();
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("WWW-Authenticate: Basic realm=\"base\"\r\n"));
    }

    #[test]
    fn stream_responses_by_version() {
        assert_eq!(stream_response(NtripVersion::V1, now()), b"ICY 200 OK\r\n\r\n");
        let v2 = String::from_utf8(stream_response(NtripVersion::V2, now())).unwrap();
        assert!(v2.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(v2.ends_with("Content-Type: gnss/data\r\n\r\n"));
    }

    #[test]
    fn sourcetable_response_length() {
        let body = "STR;MP;\r\nENDSOURCETABLE\r\n";
        let raw = sourcetable_response(NtripVersion::V2, body, now());
        let (head, rest) = parse(&raw);
        assert_eq!(head.headers.get("content-length"), Some("25"));
        assert_eq!(rest, body.as_bytes());
        assert_eq!(head.body_kind(rest), BodyKind::Sourcetable);
    }
}
