//! 160-bit address hash.

use crate::constants::ADDRESS_SIZE;
use crate::CoreError;
use dbft_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 160-bit script hash, stored little-endian.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UInt160([u8; ADDRESS_SIZE]);

impl UInt160 {
    /// The all-zero address.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Builds an address from exactly 20 little-endian bytes.
    pub fn from_bytes(value: &[u8]) -> Result<Self, CoreError> {
        let bytes: [u8; ADDRESS_SIZE] = value
            .try_into()
            .map_err(|_| CoreError::invalid_format(format!("UInt160 needs {ADDRESS_SIZE} bytes, got {}", value.len())))?;
        Ok(Self(bytes))
    }

    /// The little-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl From<[u8; ADDRESS_SIZE]> for UInt160 {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        ADDRESS_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<ADDRESS_SIZE>()?))
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt160({self})")
    }
}

impl FromStr for UInt160 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(hex_str)
            .map_err(|e| CoreError::invalid_format(format!("invalid hex: {e}")))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}
