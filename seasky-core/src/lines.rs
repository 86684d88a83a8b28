//! Line-delimited text framing for AVR and NMEA feeds.
//!
//! Shares the discrete-message contract of [`crate::beast::BeastFramer`]:
//! bytes in, complete messages out, state carried across reads.

use tracing::debug;

use crate::types::hex_decode;

/// Longest line kept before the buffer is discarded as garbage.
pub const MAX_LINE_LEN: usize = 1024;

/// Incremental newline framer. `\r\n` and `\n` both terminate a line.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    /// Set after an overlong line; bytes are dropped until the next newline.
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        LineFramer {
            buf: Vec::with_capacity(128),
            max_len,
            discarding: false,
        }
    }

    /// Consume a chunk and return every non-empty line it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &byte in data {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else if let Some(line) = self.take() {
                    out.push(line);
                }
            } else if self.discarding {
                continue;
            } else if self.buf.len() >= self.max_len {
                debug!(len = self.buf.len(), "discarding overlong line");
                self.buf.clear();
                self.discarding = true;
            } else {
                self.buf.push(byte);
            }
        }
        out
    }

    /// Flush an unterminated final line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        self.take()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    fn take(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Extract Mode S bytes from one AVR text line.
///
/// Accepts plain hex, `*hex;` and the timestamped `@<12 hex ts><hex>;` form.
pub fn clean_hex_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let hex = if let Some(inner) = line.strip_prefix('*') {
        inner.strip_suffix(';')?
    } else if let Some(inner) = line.strip_prefix('@') {
        let inner = inner.strip_suffix(';')?;
        inner.get(12..)?
    } else {
        line
    };

    if is_valid_hex(hex) {
        hex_decode(hex)
    } else {
        None
    }
}

fn is_valid_hex(s: &str) -> bool {
    (s.len() == 14 || s.len() == 28) && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_framer_split_reads() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"*8D4840D6202C").is_empty());
        let lines = framer.push(b"C371C32CE0576098;\r\n\n!AIVDM");
        assert_eq!(lines, vec!["*8D4840D6202CC371C32CE0576098;"]);
        assert_eq!(framer.finish().as_deref(), Some("!AIVDM"));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_line_framer_overlong_discarded() {
        let mut framer = LineFramer::new(8);
        let lines = framer.push(b"0123456789abc\nok\n");
        assert_eq!(lines, vec!["ok"]);
    }

    #[test]
    fn test_line_framer_overlong_tail_split_across_reads() {
        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"0123456789").is_empty());
        assert!(framer.push(b"!AIVDM,tail").is_empty());
        assert_eq!(framer.finish(), None);

        assert_eq!(framer.push(b"0123456789ab
next
"), vec!["next"]);
    }

    #[test]
    fn test_clean_hex_line_plain() {
        let result = clean_hex_line("8D4840D6202CC371C32CE0576098").unwrap();
        assert_eq!(result.len(), 14);
        assert_eq!(result[0], 0x8D);
    }

    #[test]
    fn test_clean_hex_line_dump1090() {
        assert!(clean_hex_line("*8D4840D6202CC371C32CE0576098;").is_some());
        assert!(clean_hex_line("*8d4840d6202cc371c32ce0576098;").is_some());
    }

    #[test]
    fn test_clean_hex_line_timestamped() {
        let result = clean_hex_line("@0123456789AB8D4840D6202CC371C32CE0576098;").unwrap();
        assert_eq!(result[..4], [0x8D, 0x48, 0x40, 0xD6]);
    }

    #[test]
    fn test_clean_hex_line_rejects() {
        assert!(clean_hex_line("# comment").is_none());
        assert!(clean_hex_line("  ").is_none());
        assert!(clean_hex_line("not hex at all").is_none());
        assert!(clean_hex_line("8D4840").is_none());
        assert!(clean_hex_line("*8D4840D6202CC371C32CE0576098").is_none());
    }

    #[test]
    fn test_clean_hex_line_short_frame() {
        let result = clean_hex_line("02E197C845AC82").unwrap();
        assert_eq!(result.len(), 7);
    }
}
