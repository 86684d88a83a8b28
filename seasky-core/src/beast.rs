//! BEAST binary stream framing.
//!
//! A BEAST feed is a continuous byte stream in which every message is
//! introduced by the escape byte `0x1A` followed by a type byte. A literal
//! `0x1A` inside a message is sent doubled. The framer is a pure
//! byte-in/message-out transform, one instance per connection.
//!
//! Emitted messages start with the type byte, followed by a 6-byte MLAT
//! timestamp and a 1-byte signal level, then the Mode S payload:
//!
//! ```text
//! [type][ts0..ts5][signal][payload...]
//! ```

use tracing::debug;

/// Escape / delimiter byte.
pub const ESCAPE: u8 = 0x1A;

/// Type byte + 6-byte timestamp + signal level.
pub const HEADER_LEN: usize = 8;

/// Shortest buffer worth emitting.
pub const MIN_MESSAGE_LEN: usize = 10;

/// Longest message kept between delimiters. A long Mode S frame is 22 bytes.
pub const MAX_MESSAGE_LEN: usize = 64;

/// BEAST message type, from the byte that follows the delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeastKind {
    ModeAc,
    ModeSShort,
    ModeSLong,
    Status,
    Unknown(u8),
}

impl BeastKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'1' => BeastKind::ModeAc,
            b'2' => BeastKind::ModeSShort,
            b'3' => BeastKind::ModeSLong,
            b'4' => BeastKind::Status,
            other => BeastKind::Unknown(other),
        }
    }
}

/// Incremental escape-delimited framer.
///
/// Feed bytes with [`BeastFramer::push`] as they arrive; state carries
/// across calls so an escape sequence may be split between reads.
#[derive(Debug)]
pub struct BeastFramer {
    buf: Vec<u8>,
    escape_pending: bool,
    /// Set after an overlong run; bytes are dropped until the next delimiter.
    discarding: bool,
    min_len: usize,
}

impl Default for BeastFramer {
    fn default() -> Self {
        BeastFramer::new(MIN_MESSAGE_LEN)
    }
}

impl BeastFramer {
    pub fn new(min_len: usize) -> Self {
        BeastFramer {
            buf: Vec::with_capacity(32),
            escape_pending: false,
            discarding: false,
            min_len,
        }
    }

    /// Consume a chunk of the stream and return every message it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();

        for &byte in data {
            if self.escape_pending {
                self.escape_pending = false;
                if byte == ESCAPE {
                    // Doubled escape is one literal byte
                    self.store(ESCAPE);
                } else {
                    if let Some(msg) = self.take() {
                        out.push(msg);
                    }
                    self.discarding = false;
                    // The byte after the delimiter opens the next message
                    self.store(byte);
                }
            } else if byte == ESCAPE {
                self.escape_pending = true;
            } else {
                self.store(byte);
            }
        }

        out
    }

    fn store(&mut self, byte: u8) {
        if self.discarding {
            return;
        }
        if self.buf.len() >= MAX_MESSAGE_LEN {
            debug!(len = self.buf.len(), "discarding overlong BEAST message");
            self.buf.clear();
            self.discarding = true;
            return;
        }
        self.buf.push(byte);
    }

    /// Flush whatever is buffered at end of stream.
    ///
    /// A dangling escape byte is dropped.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.escape_pending = false;
        self.discarding = false;
        self.take()
    }

    /// Drop all state, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.escape_pending = false;
        self.discarding = false;
    }

    /// Bytes currently buffered for the next message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        let msg = std::mem::take(&mut self.buf);
        if msg.len() < self.min_len {
            debug!(len = msg.len(), "skipping short BEAST message");
            return None;
        }
        Some(msg)
    }
}

/// Strip the 8-byte BEAST header, leaving the Mode S payload.
pub fn strip_header(msg: &[u8]) -> Option<&[u8]> {
    if msg.len() <= HEADER_LEN {
        return None;
    }
    Some(&msg[HEADER_LEN..])
}

/// Type of a framed message.
pub fn kind(msg: &[u8]) -> Option<BeastKind> {
    msg.first().map(|&b| BeastKind::from_byte(b))
}

/// Build a wire-format BEAST message, doubling any escape bytes.
/// Used for replay captures and tests.
pub fn encode(kind: u8, timestamp: [u8; 6], signal: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + HEADER_LEN + 4);
    out.push(ESCAPE);
    out.push(kind);
    for &b in timestamp.iter().chain(std::iter::once(&signal)).chain(payload) {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPE);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    #[test]
    fn test_no_escape_emits_one_on_finish() {
        let mut framer = BeastFramer::default();
        let data: Vec<u8> = (0x30..0x40).collect();
        assert!(framer.push(&data).is_empty());
        assert_eq!(framer.finish(), Some(data));
    }

    #[test]
    fn test_no_escape_short_stream_emits_nothing() {
        let mut framer = BeastFramer::default();
        assert!(framer.push(&[1, 2, 3]).is_empty());
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_doubled_escape_is_single_literal() {
        let mut framer = BeastFramer::default();
        let mut stream = vec![0x33, 1, 2, 3, 4, ESCAPE, ESCAPE, 5, 6, 7, 8];
        stream.extend_from_slice(&[ESCAPE, 0x32]);

        let msgs = framer.push(&stream);
        assert_eq!(msgs, vec![vec![0x33, 1, 2, 3, 4, ESCAPE, 5, 6, 7, 8]]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut framer = BeastFramer::default();
        let mut msgs = framer.push(&[0x33, 1, 2, 3, 4, 5, 6, 7, 8, ESCAPE]);
        assert!(msgs.is_empty());
        msgs = framer.push(&[ESCAPE, 9, ESCAPE]);
        assert!(msgs.is_empty());
        msgs = framer.push(&[0x32]);
        assert_eq!(msgs, vec![vec![0x33, 1, 2, 3, 4, 5, 6, 7, 8, ESCAPE, 9]]);
    }

    #[test]
    fn test_short_message_between_delimiters_dropped() {
        let mut framer = BeastFramer::default();
        let long: Vec<u8> = (0x40..0x50).collect();

        let mut stream = vec![ESCAPE, 0x31, 1, 2];
        stream.push(ESCAPE);
        stream.extend_from_slice(&long);
        stream.extend_from_slice(&[ESCAPE, 0x33]);

        let msgs = framer.push(&stream);
        assert_eq!(msgs, vec![long]);
    }

    #[test]
    fn test_encode_then_frame_recovers_payload() {
        let payload = hex_decode("8D4840D61A2CC371C32CE0576098").unwrap();
        let mut stream = encode(b'3', [0, 1, 2, 3, 4, 5], 0x80, &payload);
        stream.extend_from_slice(&[ESCAPE, b'2']);

        let mut framer = BeastFramer::default();
        let msgs = framer.push(&stream);
        assert_eq!(msgs.len(), 1);
        assert_eq!(kind(&msgs[0]), Some(BeastKind::ModeSLong));
        assert_eq!(strip_header(&msgs[0]), Some(payload.as_slice()));
    }

    #[test]
    fn test_strip_header() {
        let msg = [b'2', 0, 0, 0, 0, 0, 0, 0x50, 0x5D, 1, 2];
        assert_eq!(strip_header(&msg), Some(&[0x5D, 1, 2][..]));
        assert_eq!(strip_header(&msg[..8]), None);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut framer = BeastFramer::default();
        framer.push(&[1, 2, 3, ESCAPE]);
        framer.reset();
        assert_eq!(framer.pending(), 0);
        assert!(framer.push(&[ESCAPE]).is_empty());
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_unescaped_flood_is_bounded() {
        let mut framer = BeastFramer::default();
        let flood = vec![0x55u8; 1 << 20];
        assert!(framer.push(&flood).is_empty());
        assert!(framer.pending() <= MAX_MESSAGE_LEN);

        let payload = hex_decode("8D4840D6202CC371C32CE0576098").unwrap();
        let mut stream = encode(b'3', [0; 6], 0x40, &payload);
        stream.extend_from_slice(&[ESCAPE, b'2']);
        let msgs = framer.push(&stream);
        assert_eq!(msgs.len(), 1);
        assert_eq!(strip_header(&msgs[0]), Some(payload.as_slice()));
    }
}
