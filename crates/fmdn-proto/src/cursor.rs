//! Checked byte cursors.
//!
//! [`Reader`] pulls big-endian fields from a borrowed slice and [`Writer`]
//! pushes them into an owned buffer with a hard size limit. Both fail with a
//! [`ProtocolError`] instead of reading or writing out of bounds, which is the
//! only way the codecs in this crate touch bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Read cursor over an untrusted byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes.
    pub fn pull_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len()).ok_or(
            ProtocolError::FrameTooShort {
                expected: self.pos.saturating_add(len),
                actual: self.buf.len(),
            },
        )?;

        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Copy the next `N` bytes into an array.
    pub fn pull_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.pull_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Read one byte.
    pub fn pull_u8(&mut self) -> Result<u8> {
        let [byte] = self.pull_array::<1>()?;
        Ok(byte)
    }

    /// Read a big-endian `u16`.
    pub fn pull_u16(&mut self) -> Result<u16> {
        self.pull_array::<2>().map(u16::from_be_bytes)
    }

    /// Read a big-endian `u32`.
    pub fn pull_u32(&mut self) -> Result<u32> {
        self.pull_array::<4>().map(u32::from_be_bytes)
    }

    /// Read one byte if any remain.
    pub fn pull_optional_u8(&mut self) -> Option<u8> {
        self.pull_u8().ok()
    }

    /// Borrow everything not yet consumed.
    pub fn pull_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Ensure the whole input was consumed.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// Write cursor with a fixed upper bound on the encoded size.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: BytesMut,
    limit: usize,
}

impl Writer {
    /// Create a writer that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self { buf: BytesMut::with_capacity(limit.min(256)), limit }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn reserve(&self, needed: usize) -> Result<()> {
        let available = self.limit - self.buf.len();
        if needed > available {
            return Err(ProtocolError::CapacityExceeded { needed, available });
        }
        Ok(())
    }

    /// Append one byte.
    pub fn push_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Append a big-endian `u16`.
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    /// Append a big-endian `u32`.
    pub fn push_u32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Append raw bytes.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Finish writing and hand out the encoded bytes.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
