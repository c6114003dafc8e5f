//! Compressed secp256r1 public keys.

use crate::constants::COMPRESSED_KEY_SIZE;
use crate::{crypto, CoreError};
use dbft_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use p256::ecdsa::VerifyingKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A validator public key: a 33-byte compressed secp256r1 point.
///
/// Ordered by compressed encoding; validator sets rely on this order being
/// total and identical on every node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; COMPRESSED_KEY_SIZE]);

impl PublicKey {
    /// Builds a key from a 33-byte compressed encoding, validating the point.
    pub fn from_bytes(value: &[u8]) -> Result<Self, CoreError> {
        let bytes: [u8; COMPRESSED_KEY_SIZE] = value.try_into().map_err(|_| {
            CoreError::invalid_format(format!(
                "compressed key needs {COMPRESSED_KEY_SIZE} bytes, got {}",
                value.len()
            ))
        })?;
        VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// The compressed encoding.
    pub fn as_bytes(&self) -> &[u8; COMPRESSED_KEY_SIZE] {
        &self.0
    }

    /// Verifies a raw 64-byte signature over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        crypto::verify_signature(message, signature, &self.0)
    }
}

impl Serializable for PublicKey {
    fn size(&self) -> usize {
        COMPRESSED_KEY_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let bytes = reader.read_array::<COMPRESSED_KEY_SIZE>()?;
        PublicKey::from_bytes(&bytes).map_err(|e| IoError::invalid_data(e.to_string()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

// 33-byte arrays have no serde impls; encode as hex for diagnostics.
impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        PublicKey::from_bytes(&bytes).map_err(D::Error::custom)
    }
}
