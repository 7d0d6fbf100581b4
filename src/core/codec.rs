//! Checked little-endian encoding for fixed-layout catalog records
//!
//! Every on-disk structure is decoded through [`ByteReader`], which checks each
//! read against the slice length, and encoded through [`ByteWriter`], which
//! appends into an owned buffer and pads to the record size.

use crate::core::error::{CatalogError, Result};

/// Sequential reader over a borrowed byte slice
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    /// Reader starting at `offset`
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        ByteReader { buf, pos: offset }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(CatalogError::Truncated {
                offset: self.pos,
                needed: n,
                len: self.buf.len(),
            }),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// NUL-terminated string stored in a field of `width` bytes
    pub fn fixed_str(&mut self, width: usize) -> Result<String> {
        Ok(str_from_field(self.take(width)?))
    }
}

/// Appending writer producing one fixed-size record
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(size: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(size),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Zero-fill up to `offset`; no-op if already past it
    pub fn pad_to(&mut self, offset: usize) -> &mut Self {
        if self.buf.len() < offset {
            self.buf.resize(offset, 0);
        }
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Write `s` into a `width`-byte field, truncated so a NUL always remains
    pub fn fixed_str(&mut self, s: &str, width: usize) -> &mut Self {
        let start = self.buf.len();
        self.buf.resize(start + width, 0);
        put_str_field(&mut self.buf[start..start + width], s);
        self
    }

    /// Finish the record at exactly `size` bytes
    pub fn finish(mut self, size: usize) -> Vec<u8> {
        self.buf.resize(size, 0);
        self.buf
    }
}

/// Decode a NUL-terminated field, replacing invalid UTF-8
pub fn str_from_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Compare a NUL-terminated field with `s` without allocating
pub fn field_eq(field: &[u8], s: &str) -> bool {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end] == s.as_bytes()
}

/// Store `s` in `field`, zero-padded and truncated on a char boundary
pub fn put_str_field(field: &mut [u8], s: &str) {
    field.fill(0);
    let max = field.len().saturating_sub(1);
    let mut n = s.len().min(max);
    while n > 0 && !s.is_char_boundary(n) {
        n -= 1;
    }
    field[..n].copy_from_slice(&s.as_bytes()[..n]);
}

/// Truncate `s` to what fits in a `width`-byte field
pub fn clip(s: &str, width: usize) -> String {
    let mut n = s.len().min(width.saturating_sub(1));
    while n > 0 && !s.is_char_boundary(n) {
        n -= 1;
    }
    s[..n].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_rejects_short_buffer() {
        let buf = [1u8, 0, 0];
        let mut r = ByteReader::new(&buf);
        assert!(matches!(
            r.u32(),
            Err(CatalogError::Truncated {
                offset: 0,
                needed: 4,
                len: 3
            })
        ));
    }

    #[test]
    fn test_writer_layout() {
        let mut w = ByteWriter::with_capacity(16);
        w.u16(0x0102).pad_to(4).u32(7).fixed_str("VSN001", 8);
        let out = w.finish(16);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[0..2], &[0x02, 0x01]);
        assert_eq!(&out[2..4], &[0, 0]);

        let mut r = ByteReader::new(&out);
        assert_eq!(r.u16().unwrap(), 0x0102);
        r.seek(4);
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.fixed_str(8).unwrap(), "VSN001");
    }

    #[test]
    fn test_string_field_keeps_terminator() {
        let mut field = [0xffu8; 4];
        put_str_field(&mut field, "ABCDEF");
        assert_eq!(&field, b"ABC\0");
        assert!(field_eq(&field, "ABC"));
        assert!(!field_eq(&field, "AB"));
        assert_eq!(clip("ABCDEF", 4), "ABC");
    }
}
