//! Header block detection and parsing shared by requests and responses.

use crate::error::{ProtocolError, ProtocolResult};

/// Largest header block accepted from a peer.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Case-insensitive header list; names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_ascii_lowercase(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parse `Name: value` lines; lines without a colon are ignored.
    pub(crate) fn parse<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut headers = Self::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim(), value.trim());
            }
        }
        headers
    }
}

/// Length of the header block at the start of `buf`, separator included.
///
/// `ICY` responses end at the status line; a blank line directly after it
/// is consumed when present.
pub fn head_length(buf: &[u8]) -> Option<usize> {
    if buf.starts_with(b"ICY") {
        let end = find(buf, b"\r\n")? + 2;
        return Some(if buf[end..].starts_with(b"\r\n") {
            end + 2
        } else {
            end
        });
    }
    find(buf, b"\r\n\r\n").map(|pos| pos + 4)
}

/// Like [`head_length`], but fails once `buf` exceeds [`MAX_HEAD_SIZE`].
pub fn check_head(buf: &[u8]) -> ProtocolResult<Option<usize>> {
    match head_length(buf) {
        Some(len) => Ok(Some(len)),
        None if buf.len() > MAX_HEAD_SIZE => Err(ProtocolError::HeaderTooLarge { max: MAX_HEAD_SIZE }),
        None => Ok(None),
    }
}

pub(crate) fn head_text(head: &[u8]) -> ProtocolResult<&str> {
    std::str::from_utf8(head).map_err(|_| ProtocolError::InvalidEncoding)
}

/// Position of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_head_ends_at_blank_line() {
        let buf = b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nBODY";
        assert_eq!(head_length(buf), Some(buf.len() - 4));
    }

    #[test]
    fn icy_head_is_status_line() {
        assert_eq!(head_length(b"ICY 200 OK\r\n\xd3\x00"), Some(12));
        assert_eq!(head_length(b"ICY 200 OK\r\n\r\n\xd3"), Some(14));
    }

    #[test]
    fn incomplete_head() {
        assert_eq!(head_length(b"HTTP/1.1 200 OK\r\n"), None);
        assert!(check_head(&vec![b'a'; MAX_HEAD_SIZE + 1]).is_err());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let headers = Headers::parse(["Content-Type: gnss/data", "garbage"].into_iter());
        assert_eq!(headers.get("content-type"), Some("gnss/data"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("gnss/data"));
        assert_eq!(headers.iter().count(), 1);
    }
}
