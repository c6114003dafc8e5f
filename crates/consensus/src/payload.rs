//! The signed envelope wrapping every consensus message.

use crate::messages::ConsensusMessage;
use dbft_core::constants::MAX_BLOCK_SIZE;
use dbft_core::{crypto, UInt256, Witness};
use dbft_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A consensus payload: the common envelope plus one message.
///
/// Payloads are immutable once built; the witness is attached by the
/// factory right after construction and before the payload is shared.
/// The payload hash covers everything except the witness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusPayload {
    /// Protocol version of the block being decided.
    pub version: u32,

    /// Hash of the parent block.
    pub prev_hash: UInt256,

    /// Height being decided.
    pub block_index: u32,

    /// Slot of the sending validator.
    pub validator_index: u16,

    /// The consensus message.
    pub message: ConsensusMessage,

    /// The sender's witness; empty when signing failed or is pending.
    pub witness: Witness,

    #[serde(skip)]
    hash: OnceLock<UInt256>,
}

impl ConsensusPayload {
    /// Builds an unsigned payload.
    pub fn new(
        version: u32,
        prev_hash: UInt256,
        block_index: u32,
        validator_index: u16,
        message: ConsensusMessage,
    ) -> Self {
        Self {
            version,
            prev_hash,
            block_index,
            validator_index,
            message,
            witness: Witness::empty(),
            hash: OnceLock::new(),
        }
    }

    /// The bytes the sender's signature covers.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize_unsigned(&mut writer);
        writer.into_bytes()
    }

    /// The payload hash: double SHA-256 of the unsigned data, cached.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash
            .get_or_init(|| crypto::hash256(&self.unsigned_data()))
    }

    /// Whether a witness is attached.
    pub fn is_signed(&self) -> bool {
        !self.witness.is_empty()
    }

    /// View number stamped on the carried message.
    pub fn view_number(&self) -> u8 {
        self.message.view_number
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        writer.write_serializable(&self.prev_hash);
        writer.write_u32(self.block_index);
        writer.write_u16(self.validator_index);
        writer.write_var_bytes(&self.message.to_array());
    }
}

impl PartialEq for ConsensusPayload {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.prev_hash == other.prev_hash
            && self.block_index == other.block_index
            && self.validator_index == other.validator_index
            && self.message == other.message
            && self.witness == other.witness
    }
}

impl Eq for ConsensusPayload {}

impl Serializable for ConsensusPayload {
    fn size(&self) -> usize {
        4 + 32 + 4 + 2 + helper::get_var_bytes_size(&self.message.to_array()) + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        writer.write_serializable(&self.witness);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u32()?;
        let prev_hash = <UInt256 as Serializable>::deserialize(reader)?;
        let block_index = reader.read_u32()?;
        let validator_index = reader.read_u16()?;
        let message_bytes = reader.read_var_bytes(MAX_BLOCK_SIZE)?;
        let message = ConsensusMessage::from_array(&message_bytes)?;
        let witness = <Witness as Serializable>::deserialize(reader)?;
        Ok(Self {
            version,
            prev_hash,
            block_index,
            validator_index,
            message,
            witness,
            hash: OnceLock::new(),
        })
    }
}
