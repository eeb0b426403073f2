//! Byte cursors over caller-owned slices.
//!
//! [`ByteReader`] and [`ByteWriter`] carry a position together with the
//! underlying slice, so every read or write is checked against the bytes that
//! are actually there. A short read reports
//! [`ComcryptError::IncompleteBlock`]; a write past the end reports
//! [`ComcryptError::BufferTooSmall`]. Neither ever touches memory outside the
//! slice.
//!
//! Multi-byte values are big-endian (MSB-first).
//!
//! # Example
//!
//! ```
//! use comcrypt_core::cursor::{ByteReader, ByteWriter};
//!
//! let mut buf = [0u8; 4];
//! let mut writer = ByteWriter::new(&mut buf);
//! writer.put_u8(0xC4).unwrap();
//! writer.put_u16(0xBEEF).unwrap();
//! assert_eq!(writer.position(), 3);
//!
//! let mut reader = ByteReader::new(&buf);
//! assert_eq!(reader.read_u8().unwrap(), 0xC4);
//! assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
//! ```

use crate::error::{ComcryptError, Result};

/// Read cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    /// Input data.
    data: &'a [u8],
    /// Current byte position.
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a new reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn ensure(&self, count: usize) -> Result<()> {
        let remaining = self.remaining();
        if remaining < count {
            return Err(ComcryptError::incomplete(count - remaining));
        }
        Ok(())
    }

    /// Read one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Read a big-endian `u16`.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Borrow the next `count` bytes and advance past them.
    pub fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }
}

/// Write cursor over a mutable byte slice.
///
/// Capacity is the slice length; the writer never grows.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    /// Output buffer.
    buf: &'a mut [u8],
    /// Current byte position.
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    /// Create a new writer positioned at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check that `count` more bytes fit without writing anything.
    #[inline]
    pub fn ensure(&self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(ComcryptError::buffer_too_small(
                self.pos + count,
                self.buf.len(),
            ));
        }
        Ok(())
    }

    /// Write one byte.
    #[inline]
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.ensure(1)?;
        self.buf[self.pos] = value;
        self.pos += 1;
        Ok(())
    }

    /// Write a big-endian `u16`.
    #[inline]
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_slice(&value.to_be_bytes())
    }

    /// Write a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_slice(&value.to_be_bytes())
    }

    /// Copy `data` into the buffer.
    pub fn put_slice(&mut self, data: &[u8]) -> Result<()> {
        self.ensure(data.len())?;
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }
}
