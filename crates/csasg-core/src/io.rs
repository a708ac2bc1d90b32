//! Little-endian primitives for the `csi` and filter formats.
//!
//! Every integer is written with `to_le_bytes` and read back with
//! `from_le_bytes`. A short read surfaces as [`FormatError::Truncated`]
//! rather than a raw I/O error.

use std::io::{self, Read, Write};

use crate::error::{CoreError, FormatError};

/// Largest up-front allocation made from an untrusted count.
pub(crate) const MAX_PREALLOC: usize = 1 << 16;

/// Writer for little-endian framed data.
pub struct BinaryWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        BinaryWriter { inner, written: 0 }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), CoreError> {
        self.write_bytes(&[v])
    }

    pub fn write_bool(&mut self, v: bool) -> Result<(), CoreError> {
        self.write_u8(u8::from(v))
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), CoreError> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), CoreError> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), CoreError> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), CoreError> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Writes a length-prefixed (`u32`) UTF-8 string.
    pub fn write_str(&mut self, s: &str) -> Result<(), CoreError> {
        let len = u32::try_from(s.len())
            .map_err(|_| CoreError::malformed(format!("string of {} bytes is too long", s.len())))?;
        self.write_u32(len)?;
        self.write_bytes(s.as_bytes())
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), CoreError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reader for little-endian framed data.
pub struct BinaryReader<R: Read> {
    inner: R,
    read: u64,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        BinaryReader { inner, read: 0 }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), CoreError> {
        self.inner.read_exact(buf).map_err(truncated)?;
        self.read += buf.len() as u64;
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.array::<1>()?[0])
    }

    /// Reads a byte that must be `0` or `1`.
    pub fn read_bool(&mut self) -> Result<bool, CoreError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CoreError::malformed(format!("invalid boolean byte {other}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, CoreError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CoreError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CoreError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CoreError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
        let got = (&mut self.inner).take(len).read_to_end(&mut buf)?;
        self.read += got as u64;
        if (got as u64) < len {
            return Err(FormatError::Truncated.into());
        }
        Ok(buf)
    }

    /// Reads a length-prefixed (`u32`) UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CoreError> {
        let len = self.read_u32()?;
        let bytes = self.read_bytes(u64::from(len))?;
        String::from_utf8(bytes).map_err(|e| CoreError::malformed(format!("invalid UTF-8: {e}")))
    }

    /// Discards `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<(), CoreError> {
        let got = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        self.read += got;
        if got < len {
            return Err(FormatError::Truncated.into());
        }
        Ok(())
    }

    /// Consumes up to `magic.len()` bytes and reports whether they matched.
    ///
    /// Running out of input before the magic is complete counts as a mismatch.
    pub fn read_magic(&mut self, magic: &[u8]) -> Result<bool, CoreError> {
        let found = self.read_bytes_lenient(magic.len())?;
        Ok(found == magic)
    }

    fn read_bytes_lenient(&mut self, len: usize) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::with_capacity(len);
        let got = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.read += got as u64;
        Ok(buf)
    }

    /// Total bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

fn truncated(err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Truncated.into()
    } else {
        CoreError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut w = BinaryWriter::new(Vec::new());
        w.write_u16(0x0102).unwrap();
        w.write_u32(0x0304_0506).unwrap();
        w.write_i64(-2).unwrap();
        assert_eq!(w.bytes_written(), 14);
        let bytes = w.into_inner();
        assert_eq!(&bytes[..6], &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);

        let mut r = BinaryReader::new(&bytes[..]);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_u32().unwrap(), 0x0304_0506);
        assert_eq!(r.read_i64().unwrap(), -2);
        assert_eq!(r.bytes_read(), 14);
    }

    #[test]
    fn short_read_is_truncated() {
        let mut r = BinaryReader::new(&[1u8, 2][..]);
        assert!(matches!(
            r.read_u32(),
            Err(CoreError::Format(FormatError::Truncated))
        ));

        let mut r = BinaryReader::new(&[5u8, 0, 0, 0, b'a'][..]);
        assert!(matches!(
            r.read_string(),
            Err(CoreError::Format(FormatError::Truncated))
        ));
    }

    #[test]
    fn strings_roundtrip_and_reject_bad_utf8() {
        let mut w = BinaryWriter::new(Vec::new());
        w.write_str("System.Text").unwrap();
        let bytes = w.into_inner();
        assert_eq!(BinaryReader::new(&bytes[..]).read_string().unwrap(), "System.Text");

        let bad = [2u8, 0, 0, 0, 0xff, 0xfe];
        assert!(matches!(
            BinaryReader::new(&bad[..]).read_string(),
            Err(CoreError::Format(FormatError::Malformed { .. }))
        ));
    }

    #[test]
    fn bool_bytes_are_checked() {
        let mut r = BinaryReader::new(&[0u8, 1, 2][..]);
        assert!(!r.read_bool().unwrap());
        assert!(r.read_bool().unwrap());
        assert!(r.read_bool().is_err());
    }

    #[test]
    fn magic_mismatch_and_short_input() {
        assert!(BinaryReader::new(&b"csi\0rest"[..]).read_magic(b"csi\0").unwrap());
        assert!(!BinaryReader::new(&b"cs"[..]).read_magic(b"csi\0").unwrap());
        assert!(!BinaryReader::new(&b""[..]).read_magic(b"csi\0").unwrap());
        assert!(!BinaryReader::new(&b"xyz\0"[..]).read_magic(b"csi\0").unwrap());
    }

    #[test]
    fn skip_consumes_or_reports_truncation() {
        let mut r = BinaryReader::new(&[1u8, 2, 3, 4][..]);
        r.skip(3).unwrap();
        assert_eq!(r.read_u8().unwrap(), 4);
        assert!(matches!(
            r.skip(1),
            Err(CoreError::Format(FormatError::Truncated))
        ));
    }
}
