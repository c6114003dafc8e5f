//! Bounds-checked reader over a borrowed byte slice.

use crate::error::{IoError, IoResult};

/// Positional reader for the little-endian layouts produced by
/// [`crate::BinaryWriter`].
///
/// Borrows the underlying slice; every read is bounds-checked and returns a
/// format error rather than panicking on truncated input.
pub struct MemoryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryReader<'a> {
    /// Creates a reader over the given slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, count: usize) -> IoResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(IoError::EndOfStream {
                needed: count,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> IoResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean; any byte other than 0 or 1 is a format error.
    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_data(format!("invalid boolean byte {other:#04x}"))),
        }
    }

    /// Reads a 16-bit unsigned integer, little-endian.
    pub fn read_u16(&mut self) -> IoResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a 32-bit unsigned integer, little-endian.
    pub fn read_u32(&mut self) -> IoResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a 64-bit unsigned integer, little-endian.
    pub fn read_u64(&mut self) -> IoResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a 64-bit signed integer, little-endian.
    pub fn read_i64(&mut self) -> IoResult<i64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads exactly `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Reads exactly `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        let bytes = self.take(N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Reads a variable-length integer, rejecting values above `max`.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let prefix = self.read_u8()?;
        let value = match prefix {
            0xFD => self.read_u16()? as u64,
            0xFE => self.read_u32()? as u64,
            0xFF => self.read_u64()?,
            b => b as u64,
        };
        if value > max {
            return Err(IoError::ValueOutOfRange { value, max });
        }
        Ok(value)
    }

    /// Reads a var-int length prefix (bounded by `max`) and that many bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let length = self.read_var_int(max as u64)? as usize;
        self.read_bytes(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end_is_error() {
        let mut reader = MemoryReader::new(&[0x01, 0x02]);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert!(matches!(
            reader.read_u32(),
            Err(IoError::EndOfStream { needed: 4, available: 1 })
        ));
    }

    #[test]
    fn test_var_int_roundtrip() {
        for value in [0u64, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000] {
            let mut writer = crate::BinaryWriter::new();
            writer.write_var_int(value);
            let bytes = writer.into_bytes();
            let mut reader = MemoryReader::new(&bytes);
            assert_eq!(reader.read_var_int(u64::MAX).unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_var_int_bound_enforced() {
        let mut writer = crate::BinaryWriter::new();
        writer.write_var_int(600);
        let bytes = writer.into_bytes();
        let mut reader = MemoryReader::new(&bytes);
        assert!(matches!(
            reader.read_var_int(512),
            Err(IoError::ValueOutOfRange { value: 600, max: 512 })
        ));
    }

    #[test]
    fn test_invalid_boolean() {
        let mut reader = MemoryReader::new(&[0x02]);
        assert!(reader.read_bool().is_err());
    }
}
