//! Frame grammar and receive-side buffering.
//!
//! ```text
//! frame  = "#FR=" <decimal length> "\n" <payload> "#END\n"
//! close  = "#CLOSE\n"
//! ```

use crate::error::{Result, StreamError};

/// Prefix of a frame header line.
pub const FRAME_PREFIX: &[u8] = b"#FR=";

/// Bytes that follow every payload.
pub const FRAME_TRAILER: &[u8] = b"#END\n";

/// Sentinel sent instead of a frame to end the connection.
pub const CLOSE_SENTINEL: &[u8] = b"#CLOSE\n";

/// Longest header line accepted before giving up on finding a newline.
pub(crate) const MAX_HEADER_LEN: usize = 32;

/// A parsed header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// A frame with this many payload bytes follows.
    Frame(usize),
    /// The peer is closing the stream.
    Close,
}

/// Parse a header line, without its trailing newline.
pub fn parse_header(line: &[u8]) -> Result<Header> {
    if line == &CLOSE_SENTINEL[..CLOSE_SENTINEL.len() - 1] {
        return Ok(Header::Close);
    }
    let malformed = || StreamError::MalformedHeader(String::from_utf8_lossy(line).into_owned());

    let digits = line.strip_prefix(FRAME_PREFIX).ok_or_else(malformed)?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .map(Header::Frame)
        .ok_or_else(malformed)
}

/// Encode one complete frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = format!("#FR={}\n", payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len() + FRAME_TRAILER.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(FRAME_TRAILER);
    out
}

/// Bytes received but not yet consumed.
#[derive(Debug, Default)]
pub(crate) struct Inbox {
    data: Vec<u8>,
    start: usize,
}

impl Inbox {
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 && self.start >= self.data.len() / 2 {
            self.data.drain(..self.start);
            self.start = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn pending(&self) -> usize {
        self.data.len() - self.start
    }

    /// Take one line, without its newline, if a full line is buffered.
    pub fn take_line(&mut self) -> Option<Vec<u8>> {
        let rest = &self.data[self.start..];
        let end = rest.iter().position(|&b| b == b'\n')?;
        let line = rest[..end].to_vec();
        self.start += end + 1;
        Some(line)
    }

    /// Take exactly `n` bytes if that many are buffered.
    pub fn take_exact(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.pending() < n {
            return None;
        }
        let out = self.data[self.start..self.start + n].to_vec();
        self.start += n;
        Some(out)
    }
}
