//! Buffered XML scanning using memchr
//!
//! The scanner owns the read buffer, refills it from a `ByteSource` on
//! demand and keeps line/column/offset bookkeeping. Delimiter searches
//! within the buffered window use memchr (SIMD when available).

use crate::error::{Result, XmlError};
use crate::reader::buffered::ByteSource;
use crate::reader::events::Location;
use memchr::{memchr, memchr2, memchr2_iter, memchr3};

/// Scanner for XML delimiter detection over a refillable buffer
pub struct Scanner {
    source: Box<dyn ByteSource + Send>,
    buffer: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
    /// Absolute offset of `buffer[0]`
    base: u64,
    line: u32,
    /// Absolute offset of the first byte of the current line
    line_start: u64,
    /// Last consumed byte was `\r`, so a following `\n` ends no new line
    after_cr: bool,
}

impl Scanner {
    /// Create a new scanner reading from `source`
    pub fn new(source: Box<dyn ByteSource + Send>, capacity: usize) -> Self {
        Scanner {
            source,
            buffer: vec![0u8; capacity.max(16)],
            pos: 0,
            end: 0,
            eof: false,
            base: 0,
            line: 1,
            line_start: 0,
            after_cr: false,
        }
    }

    /// Absolute offset of the next unread byte
    #[inline]
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Location of the next unread byte
    pub fn location(&self) -> Location {
        let offset = self.offset();
        let column = (offset - self.line_start + 1).min(u32::MAX as u64) as u32;
        Location::new(self.line, column, offset)
    }

    /// Fill the buffer from the source. Returns false at end of input.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }

        // Compact: move remaining data to start
        if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.end, 0);
            self.base += self.pos as u64;
            self.end -= self.pos;
            self.pos = 0;
        }

        if self.end == self.buffer.len() {
            let grown = self.buffer.len() * 2;
            log::debug!(target: "rustystax::scanner", "growing scanner buffer to {} bytes", grown);
            self.buffer.resize(grown, 0);
        }

        let window = self.buffer.len() - self.end;
        match self.source.read_chunk(&mut self.buffer[self.end..])? {
            None => {
                self.eof = true;
                Ok(false)
            }
            Some(0) => Err(XmlError::IoAnomaly(format!(
                "source returned 0 bytes for a {}-byte read at offset {} without signalling end of input",
                window,
                self.base + self.end as u64
            ))),
            Some(n) if n > window => Err(XmlError::IoAnomaly(format!(
                "source reported {} bytes for a {}-byte read",
                n, window
            ))),
            Some(n) => {
                self.end += n;
                Ok(true)
            }
        }
    }

    /// Make sure at least `n` bytes are buffered. Returns false if the
    /// input ends first.
    #[inline]
    pub fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.end - self.pos < n {
            if !self.fill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Check if we've reached the end
    pub fn is_eof(&mut self) -> Result<bool> {
        Ok(!self.ensure(1)?)
    }

    /// Peek at current byte without advancing
    #[inline]
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.pos < self.end {
            return Ok(Some(self.buffer[self.pos]));
        }
        if !self.ensure(1)? {
            return Ok(None);
        }
        Ok(Some(self.buffer[self.pos]))
    }

    /// Peek at byte at offset from current position
    pub fn peek_at(&mut self, offset: usize) -> Result<Option<u8>> {
        if !self.ensure(offset + 1)? {
            return Ok(None);
        }
        Ok(Some(self.buffer[self.pos + offset]))
    }

    /// Check if input continues with a byte sequence
    pub fn starts_with(&mut self, needle: &[u8]) -> Result<bool> {
        if !self.ensure(needle.len())? {
            return Ok(false);
        }
        Ok(self.buffer[self.pos..].starts_with(needle))
    }

    /// Advance by n buffered bytes
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.end);
        if n == 0 {
            return;
        }
        let consumed = &self.buffer[self.pos..self.pos + n];
        // `\r\n`, `\r` and `\n` each end one line
        for i in memchr2_iter(b'\n', b'\r', consumed) {
            let crlf_tail = consumed[i] == b'\n'
                && if i == 0 { self.after_cr } else { consumed[i - 1] == b'\r' };
            if !crlf_tail {
                self.line += 1;
            }
            self.line_start = self.base + (self.pos + i + 1) as u64;
        }
        self.after_cr = consumed[n - 1] == b'\r';
        self.pos += n;
    }

    /// Consume and return the next byte
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        let b = self.peek()?;
        if b.is_some() {
            self.advance(1);
        }
        Ok(b)
    }

    /// Skip whitespace characters (space, tab, newline, carriage return)
    pub fn skip_whitespace(&mut self) -> Result<usize> {
        let mut skipped = 0;
        loop {
            let start = self.pos;
            let mut i = start;
            while i < self.end && is_whitespace(self.buffer[i]) {
                i += 1;
            }
            skipped += i - start;
            self.advance(i - start);
            if self.pos < self.end || !self.fill()? {
                return Ok(skipped);
            }
        }
    }

    /// Read an XML name into `out` (cleared first). Returns false if the
    /// next byte cannot start a name; nothing is consumed in that case.
    pub fn read_name(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        out.clear();
        match self.peek()? {
            Some(b) if is_name_start_char(b) => {}
            _ => return Ok(false),
        }
        loop {
            let start = self.pos;
            let mut i = start;
            while i < self.end && is_name_char(self.buffer[i]) {
                i += 1;
            }
            out.extend_from_slice(&self.buffer[start..i]);
            self.advance(i - start);
            if self.pos < self.end || !self.fill()? {
                return Ok(true);
            }
        }
    }

    /// Append bytes to `out` up to (not including) the first `a` or `b`.
    /// Returns the delimiter found, or None at end of input.
    pub fn read_until2(&mut self, a: u8, b: u8, out: &mut Vec<u8>) -> Result<Option<u8>> {
        loop {
            let window = &self.buffer[self.pos..self.end];
            if let Some(i) = memchr2(a, b, window) {
                let found = window[i];
                out.extend_from_slice(&window[..i]);
                self.advance(i);
                return Ok(Some(found));
            }
            let n = window.len();
            out.extend_from_slice(window);
            self.advance(n);
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Like `read_until2` with three delimiters
    pub fn read_until3(&mut self, a: u8, b: u8, c: u8, out: &mut Vec<u8>) -> Result<Option<u8>> {
        loop {
            let window = &self.buffer[self.pos..self.end];
            if let Some(i) = memchr3(a, b, c, window) {
                let found = window[i];
                out.extend_from_slice(&window[..i]);
                self.advance(i);
                return Ok(Some(found));
            }
            let n = window.len();
            out.extend_from_slice(window);
            self.advance(n);
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Append bytes to `out` up to the terminator `seq` and consume the
    /// terminator. Returns false if input ends before `seq`.
    pub fn read_until_seq(&mut self, seq: &[u8], out: &mut Vec<u8>) -> Result<bool> {
        let first = seq[0];
        loop {
            let window = &self.buffer[self.pos..self.end];
            match memchr(first, window) {
                Some(i) => {
                    out.extend_from_slice(&window[..i]);
                    self.advance(i);
                    if self.starts_with(seq)? {
                        self.advance(seq.len());
                        return Ok(true);
                    }
                    if !self.ensure(1)? {
                        return Ok(false);
                    }
                    out.push(first);
                    self.advance(1);
                }
                None => {
                    let n = window.len();
                    out.extend_from_slice(window);
                    self.advance(n);
                    if !self.fill()? {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

/// Check if byte is valid XML name start character
/// Allows ASCII letters, underscore, colon, and non-ASCII (UTF-8 Unicode)
#[inline]
pub fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

/// Check if byte is valid XML name character
/// Allows ASCII alphanumeric, punctuation, and non-ASCII (UTF-8 Unicode)
#[inline]
pub fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b':') || b >= 0x80
}

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::buffered::SliceSource;
    use std::io;

    fn scanner(input: &str, capacity: usize) -> Scanner {
        Scanner::new(Box::new(SliceSource::new(input)), capacity)
    }

    /// Hands out one byte per read to exercise refill paths
    struct Trickle(Vec<u8>, usize);

    impl ByteSource for Trickle {
        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            if self.1 >= self.0.len() {
                return Ok(None);
            }
            buf[0] = self.0[self.1];
            self.1 += 1;
            Ok(Some(1))
        }
    }

    struct Stuck;

    impl ByteSource for Stuck {
        fn read_chunk(&mut self, _buf: &mut [u8]) -> io::Result<Option<usize>> {
            Ok(Some(0))
        }
    }

    #[test]
    fn test_read_until_tag_start() {
        let mut s = scanner("hello <world>", 16);
        let mut out = Vec::new();
        assert_eq!(s.read_until2(b'<', b'&', &mut out).unwrap(), Some(b'<'));
        assert_eq!(out, b"hello ");
        assert_eq!(s.offset(), 6);
    }

    #[test]
    fn test_read_name() {
        let mut s = scanner("element-name>", 16);
        let mut out = Vec::new();
        assert!(s.read_name(&mut out).unwrap());
        assert_eq!(out, b"element-name");
        assert_eq!(s.offset(), 12);
    }

    #[test]
    fn test_skip_whitespace() {
        let mut s = scanner("  \t\n hello", 16);
        assert_eq!(s.skip_whitespace().unwrap(), 5);
        assert_eq!(s.peek().unwrap(), Some(b'h'));
    }

    #[test]
    fn test_refill_across_sequence() {
        let input = b"comment body--x-->rest".to_vec();
        let mut s = Scanner::new(Box::new(Trickle(input, 0)), 16);
        let mut out = Vec::new();
        assert!(s.read_until_seq(b"-->", &mut out).unwrap());
        assert_eq!(out, b"comment body--x");
        assert_eq!(s.peek().unwrap(), Some(b'r'));
    }

    #[test]
    fn test_location_tracking() {
        let mut s = scanner("ab\ncd\nef", 16);
        let mut out = Vec::new();
        s.read_until2(b'e', b'e', &mut out).unwrap();
        let loc = s.location();
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 1);
        assert_eq!(loc.offset, 6);
    }

    #[test]
    fn test_carriage_return_line_endings() {
        let mut s = scanner("a\rb\r\nc\n\rd", 16);
        let mut out = Vec::new();
        s.read_until2(b'd', b'd', &mut out).unwrap();
        let loc = s.location();
        assert_eq!(loc.line, 5);
        assert_eq!(loc.column, 1);
        assert_eq!(loc.offset, 8);

        // `\r\n` split across two advances still ends one line
        let mut s = scanner("x\r\ny", 16);
        s.ensure(4).unwrap();
        s.advance(2);
        s.advance(1);
        assert_eq!(s.location().line, 2);
        assert_eq!(s.location().column, 1);
    }

    #[test]
    fn test_zero_byte_read_is_anomaly() {
        let mut s = Scanner::new(Box::new(Stuck), 16);
        assert!(matches!(s.peek(), Err(XmlError::IoAnomaly(_))));
    }

    #[test]
    fn test_unterminated_sequence() {
        let mut s = scanner("no terminator", 16);
        let mut out = Vec::new();
        assert!(!s.read_until_seq(b"]]>", &mut out).unwrap());
        assert_eq!(out, b"no terminator");
    }
}
