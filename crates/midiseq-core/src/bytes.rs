//! Byte readers over untrusted input.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Reads up to eight bytes of `buf` as a big-endian unsigned integer.
///
/// Longer inputs keep their trailing eight bytes, like shifting every byte
/// into a 64-bit accumulator would.
pub fn read_be(buf: &[u8]) -> u64 {
    match buf.len() {
        0 => 0,
        n if n <= 8 => BigEndian::read_uint(buf, n),
        n => BigEndian::read_u64(&buf[n - 8..]),
    }
}

/// Reads up to eight bytes of `buf` as a little-endian unsigned integer.
pub fn read_le(buf: &[u8]) -> u64 {
    match buf.len() {
        0 => 0,
        n if n <= 8 => LittleEndian::read_uint(buf, n),
        _ => LittleEndian::read_u64(&buf[..8]),
    }
}

/// Forward-only cursor over a borrowed byte slice. Every read is bounds
/// checked; a failed read leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Takes the next `n` bytes.
    pub fn read_slice(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    /// Takes the next `n` bytes with `n` given as a decoded 64-bit length.
    pub fn read_slice_u64(&mut self, n: u64) -> Option<&'a [u8]> {
        self.read_slice(usize::try_from(n).ok()?)
    }

    /// Reads a MIDI variable-length quantity: seven bits per byte, high bit
    /// set on every byte but the last. Returns `None` when the data ends
    /// before the terminating byte.
    pub fn read_varlen(&mut self) -> Option<u64> {
        let mut value = 0u64;
        let mut pos = self.pos;
        loop {
            let b = *self.data.get(pos)?;
            pos += 1;
            value = (value << 7) | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                break;
            }
        }
        self.pos = pos;
        Some(value)
    }
}
