//! Incremental decoder for HTTP chunked transfer encoding.
//!
//! ```text
//! <hex size>[;ext]\r\n <size bytes> \r\n ... 0\r\n [trailers]\r\n
//! ```
//!
//! Input may be split at any byte; partial chunks are held until the next
//! call.

use crate::error::{ProtocolError, ProtocolResult};
use crate::head::find;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
    Done,
}

#[derive(Debug)]
pub struct ChunkedDecoder {
    pending: Vec<u8>,
    state: State,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            state: State::Size,
        }
    }

    /// True once the terminating zero-length chunk and trailers were read.
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Feed transport bytes; returns the payload bytes they complete.
    pub fn decode(&mut self, input: &[u8]) -> ProtocolResult<Vec<u8>> {
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        let mut pos = 0;

        loop {
            let rest = &self.pending[pos..];
            match self.state {
                State::Size => {
                    let Some(end) = find(rest, b"\r\n") else {
                        if rest.len() > MAX_LINE {
                            return Err(ProtocolError::InvalidChunk("size line too long".into()));
                        }
                        break;
                    };
                    let line = std::str::from_utf8(&rest[..end])
                        .map_err(|_| ProtocolError::InvalidChunk("size line not ASCII".into()))?;
                    let digits = line.split(';').next().unwrap_or_default().trim();
                    let size = usize::from_str_radix(digits, 16).map_err(|_| {
                        ProtocolError::InvalidChunk(format!("bad chunk size {digits:?}"))
                    })?;
                    pos += end + 2;
                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(remaining) => {
                    if rest.is_empty() {
                        break;
                    }
                    let take = remaining.min(rest.len());
                    output.extend_from_slice(&rest[..take]);
                    pos += take;
                    self.state = if take == remaining {
                        State::DataEnd
                    } else {
                        State::Data(remaining - take)
                    };
                }
                State::DataEnd => {
                    if rest.len() < 2 {
                        break;
                    }
                    if &rest[..2] != b"\r\n" {
                        return Err(ProtocolError::InvalidChunk(
                            "missing CRLF after chunk data".into(),
                        ));
                    }
                    pos += 2;
                    self.state = State::Size;
                }
                State::Trailer => {
                    let Some(end) = find(rest, b"\r\n") else {
                        if rest.len() > MAX_LINE {
                            return Err(ProtocolError::InvalidChunk("trailer too long".into()));
                        }
                        break;
                    };
                    pos += end + 2;
                    if end == 0 {
                        self.state = State::Done;
                    }
                }
                State::Done => {
                    pos = self.pending.len();
                    break;
                }
            }
        }

        self.pending.drain(..pos);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_body() {
        let mut decoder = ChunkedDecoder::new();
        let out = decoder
            .decode(b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n")
            .unwrap();
        assert_eq!(out, b"Wikipedia");
        assert!(decoder.is_finished());
    }

    #[test]
    fn byte_at_a_time() {
        let input = b"a\r\n0123456789\r\n3\r\nabc\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        for byte in input {
            out.extend(decoder.decode(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(out, b"0123456789abc");
        assert!(decoder.is_finished());
    }

    #[test]
    fn partial_chunk_carries_over() {
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(decoder.decode(b"6\r\nabc").unwrap(), b"abc");
        assert_eq!(decoder.decode(b"def\r\n").unwrap(), b"def");
        assert!(!decoder.is_finished());
    }

    #[test]
    fn invalid_size_is_error() {
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(b"zz\r\n").is_err());
    }

    #[test]
    fn missing_data_terminator_is_error() {
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(b"2\r\nabXY").is_err());
    }
}
