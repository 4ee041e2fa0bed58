//! Byte Sources
//!
//! The scanner pulls input through the `ByteSource` trait. End of input
//! is an explicit `None` so that a source returning zero bytes without
//! reaching EOF can be told apart and reported.

use std::io::{self, Read};

/// Bounded pull source of raw input bytes
pub trait ByteSource {
    /// Read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns `Ok(None)` at end of input, `Ok(Some(n))` otherwise.
    /// `Some(0)` for a non-empty `buf` is treated as a source fault.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Adapter for anything implementing `std::io::Read`
///
/// `Read` signals EOF with a zero-length read, so this adapter never
/// produces `Some(0)`.
pub struct ReadSource<R: Read> {
    reader: R,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        ReadSource { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.reader.read(buf) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-memory source owning its input
pub struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl SliceSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        SliceSource {
            data: data.into(),
            pos: 0,
        }
    }

    /// Bytes not yet handed out
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ByteSource for SliceSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(Some(n))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        (**self).read_chunk(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_source_eof() {
        let mut source = ReadSource::new(Cursor::new(b"<root/>".to_vec()));
        let mut buf = [0u8; 4];
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Some(4));
        assert_eq!(&buf, b"<roo");
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Some(3));
        assert_eq!(source.read_chunk(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_slice_source() {
        let mut source = SliceSource::new("abc");
        let mut buf = [0u8; 8];
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Some(3));
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), None);
    }
}
