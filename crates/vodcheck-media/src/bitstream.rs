//! Checked big-endian readers over in-memory buffers.
//!
//! Both readers are total: a short buffer yields [`Error::Truncated`] with
//! the absolute position of the failed read, never a panic.

use crate::{Error, Result};

/// Byte-aligned big-endian reader.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the enclosing buffer, for error reporting.
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Reader whose reported offsets start at `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Current position relative to the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::truncated(
                what,
                self.base + self.pos,
                n,
                self.remaining(),
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3, "u24")?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8, "u64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Read a two's-complement 24-bit value, sign-extended.
    pub fn read_i24(&mut self) -> Result<i32> {
        let v = self.read_u24()?;
        Ok(((v << 8) as i32) >> 8)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n, "skip").map(|_| ())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn slice(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n, "slice")
    }

    /// Borrow everything not yet read.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// MSB-first bit reader.
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read up to 64 bits as an unsigned value.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        if n > 64 {
            return Err(Error::unsupported(format!("bit field of {} bits", n)));
        }
        let available = (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize;
        if (n as usize) > available {
            return Err(Error::truncated(
                "bit field",
                self.byte_pos,
                (n as usize).div_ceil(8),
                available / 8,
            ));
        }

        let mut value = 0u64;
        for _ in 0..n {
            let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
            value = (value << 1) | bit as u64;
            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }
        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        let mut left = n;
        while left > 0 {
            let step = left.min(64);
            self.read_bits(step as u8)?;
            left -= step;
        }
        Ok(())
    }

    /// Byte offset of the next unread bit.
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }
}
