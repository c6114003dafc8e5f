//! 256-bit hash integer.

use crate::constants::HASH_SIZE;
use crate::CoreError;
use dbft_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 256-bit hash, stored little-endian.
///
/// Displayed and parsed as big-endian hex with a `0x` prefix, following the
/// usual block-explorer convention.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UInt256([u8; HASH_SIZE]);

impl UInt256 {
    /// The all-zero hash.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Builds a hash from exactly 32 little-endian bytes.
    pub fn from_bytes(value: &[u8]) -> Result<Self, CoreError> {
        let bytes: [u8; HASH_SIZE] = value
            .try_into()
            .map_err(|_| CoreError::invalid_format(format!("UInt256 needs {HASH_SIZE} bytes, got {}", value.len())))?;
        Ok(Self(bytes))
    }

    /// The little-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for UInt256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        HASH_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<HASH_SIZE>()?))
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({self})")
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = hex::decode(hex_str)
            .map_err(|e| CoreError::invalid_format(format!("invalid hex: {e}")))?;
        bytes.reverse();
        Self::from_bytes(&bytes)
    }
}
