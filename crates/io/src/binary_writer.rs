//! Growable binary writer for deterministic encodings.

use crate::Serializable;
use bytes::{BufMut, BytesMut};

/// Writes the little-endian binary layouts used across the stack.
///
/// Writing never fails; the buffer grows as needed. Determinism is the
/// caller's contract: the same value sequence always yields the same bytes.
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Creates a writer with a pre-allocated buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Writes a boolean as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a 16-bit unsigned integer, little-endian.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16_le(value);
    }

    /// Writes a 32-bit unsigned integer, little-endian.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32_le(value);
    }

    /// Writes a 64-bit unsigned integer, little-endian.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64_le(value);
    }

    /// Writes a 64-bit signed integer, little-endian.
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64_le(value);
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buffer.put_slice(value);
    }

    /// Writes a variable-length integer.
    ///
    /// Values below 0xFD are one byte; larger values get a 0xFD/0xFE/0xFF
    /// prefix followed by a little-endian u16/u32/u64.
    pub fn write_var_int(&mut self, value: u64) {
        if value < 0xFD {
            self.write_u8(value as u8);
        } else if value <= 0xFFFF {
            self.write_u8(0xFD);
            self.write_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE);
            self.write_u32(value as u32);
        } else {
            self.write_u8(0xFF);
            self.write_u64(value);
        }
    }

    /// Writes a var-int length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, value: &[u8]) {
        self.write_var_int(value.len() as u64);
        self.write_bytes(value);
    }

    /// Writes any [`Serializable`] value in place.
    pub fn write_serializable<T: Serializable>(&mut self, value: &T) {
        value.serialize(self);
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.freeze().to_vec()
    }

    /// Returns a copy of the encoded bytes, leaving the writer usable.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}
