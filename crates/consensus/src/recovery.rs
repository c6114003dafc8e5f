//! Recovery bundles and their compact payload forms.
//!
//! A recovery message rebuilds a peer's consensus view without shipping
//! whole payloads: each compact form carries just the fields a receiver
//! needs to reconstruct and re-verify the original payload for its height.

use crate::messages::{hex_signature, ChangeView, MessagePayload, PrepareRequest};
use crate::payload::ConsensusPayload;
use dbft_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable, SerializableExt};
use dbft_core::constants::{
    HASH_SIZE, MAX_INVOCATION_SCRIPT, MAX_VALIDATORS, SIGNATURE_SIZE,
};
use dbft_core::UInt256;
use serde::{Deserialize, Serialize};

/// Compact form of a stored ChangeView payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeViewCompact {
    /// Slot of the original sender.
    pub validator_index: u16,

    /// View the sender was in when asking to change.
    pub original_view_number: u8,

    /// Timestamp from the original message, in milliseconds.
    pub timestamp: u64,

    /// Invocation script of the original witness.
    pub invocation_script: Vec<u8>,
}

impl ChangeViewCompact {
    /// Compacts a stored ChangeView payload; None for other message kinds.
    pub fn from_payload(payload: &ConsensusPayload) -> Option<Self> {
        match &payload.message.payload {
            MessagePayload::ChangeView(ChangeView { timestamp, .. }) => Some(Self {
                validator_index: payload.validator_index,
                original_view_number: payload.message.view_number,
                timestamp: *timestamp,
                invocation_script: payload.witness.invocation_script.clone(),
            }),
            _ => None,
        }
    }
}

impl Serializable for ChangeViewCompact {
    fn size(&self) -> usize {
        2 + 1 + 8 + helper::get_var_bytes_size(&self.invocation_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u16(self.validator_index);
        writer.write_u8(self.original_view_number);
        writer.write_u64(self.timestamp);
        writer.write_var_bytes(&self.invocation_script);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            validator_index: reader.read_u16()?,
            original_view_number: reader.read_u8()?,
            timestamp: reader.read_u64()?,
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
        })
    }
}

/// Compact form of a stored preparation payload (request or response).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationCompact {
    /// Slot of the original sender.
    pub validator_index: u16,

    /// Invocation script of the original witness.
    pub invocation_script: Vec<u8>,
}

impl PreparationCompact {
    /// Compacts any stored preparation payload.
    pub fn from_payload(payload: &ConsensusPayload) -> Self {
        Self {
            validator_index: payload.validator_index,
            invocation_script: payload.witness.invocation_script.clone(),
        }
    }
}

impl Serializable for PreparationCompact {
    fn size(&self) -> usize {
        2 + helper::get_var_bytes_size(&self.invocation_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u16(self.validator_index);
        writer.write_var_bytes(&self.invocation_script);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            validator_index: reader.read_u16()?,
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
        })
    }
}

/// Compact form of a stored Commit payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCompact {
    /// View the commit was produced in.
    pub view_number: u8,

    /// Slot of the original sender.
    pub validator_index: u16,

    /// The header signature from the original commit.
    #[serde(with = "hex_signature")]
    pub signature: [u8; SIGNATURE_SIZE],

    /// Invocation script of the original witness.
    pub invocation_script: Vec<u8>,
}

impl CommitCompact {
    /// Compacts a stored Commit payload; None for other message kinds.
    pub fn from_payload(payload: &ConsensusPayload) -> Option<Self> {
        match &payload.message.payload {
            MessagePayload::Commit(commit) => Some(Self {
                view_number: payload.message.view_number,
                validator_index: payload.validator_index,
                signature: commit.signature,
                invocation_script: payload.witness.invocation_script.clone(),
            }),
            _ => None,
        }
    }
}

impl Serializable for CommitCompact {
    fn size(&self) -> usize {
        1 + 2 + SIGNATURE_SIZE + helper::get_var_bytes_size(&self.invocation_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.view_number);
        writer.write_u16(self.validator_index);
        writer.write_bytes(&self.signature);
        writer.write_var_bytes(&self.invocation_script);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            view_number: reader.read_u8()?,
            validator_index: reader.read_u16()?,
            signature: reader.read_array::<SIGNATURE_SIZE>()?,
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
        })
    }
}

/// A bundle reconstructing the sender's consensus view for a peer.
///
/// Carries at most a quorum's worth of change-view evidence but every
/// known preparation: change-views are only evidence, while the
/// preparations are the quorum being reconstructed. Commits are included
/// only when the sender itself has committed; a node that has not
/// committed must not present others' commits as certified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMessage {
    /// Change-view evidence from prior views, at most M entries.
    pub change_view_messages: Vec<ChangeViewCompact>,

    /// The proposal itself, when the sender holds the transaction list.
    pub prepare_request: Option<PrepareRequest>,

    /// Otherwise, the proposal payload hash elected by plurality over
    /// the sender's stored PrepareResponses.
    pub preparation_hash: Option<UInt256>,

    /// Compacted preparations for every non-empty slot.
    pub preparation_messages: Vec<PreparationCompact>,

    /// Compacted commits; empty unless the sender has committed.
    pub commit_messages: Vec<CommitCompact>,
}

impl Serializable for RecoveryMessage {
    fn size(&self) -> usize {
        let hash_field = match (&self.prepare_request, &self.preparation_hash) {
            (Some(request), _) => request.size(),
            (None, Some(_)) => helper::get_var_size(HASH_SIZE as u64) + HASH_SIZE,
            (None, None) => helper::get_var_size(0),
        };
        helper::get_array_size(&self.change_view_messages)
            + 1
            + hash_field
            + helper::get_array_size(&self.preparation_messages)
            + helper::get_array_size(&self.commit_messages)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        helper::serialize_array(&self.change_view_messages, writer);
        match &self.prepare_request {
            Some(request) => {
                writer.write_bool(true);
                Serializable::serialize(request, writer);
            }
            None => {
                writer.write_bool(false);
                match &self.preparation_hash {
                    Some(hash) => writer.write_var_bytes(&hash.to_array()),
                    None => writer.write_var_int(0),
                }
            }
        }
        helper::serialize_array(&self.preparation_messages, writer);
        helper::serialize_array(&self.commit_messages, writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let change_view_messages = helper::deserialize_array(reader, MAX_VALIDATORS)?;
        let (prepare_request, preparation_hash) = if reader.read_bool()? {
            (Some(<PrepareRequest as Serializable>::deserialize(reader)?), None)
        } else {
            let hash_bytes = reader.read_var_bytes(HASH_SIZE)?;
            let hash = match hash_bytes.len() {
                0 => None,
                HASH_SIZE => Some(
                    UInt256::from_bytes(&hash_bytes)
                        .map_err(|e| IoError::invalid_data(e.to_string()))?,
                ),
                other => {
                    return Err(IoError::invalid_data(format!(
                        "preparation hash must be 0 or {HASH_SIZE} bytes, got {other}"
                    )))
                }
            };
            (None, hash)
        };
        Ok(Self {
            change_view_messages,
            prepare_request,
            preparation_hash,
            preparation_messages: helper::deserialize_array(reader, MAX_VALIDATORS)?,
            commit_messages: helper::deserialize_array(reader, MAX_VALIDATORS)?,
        })
    }
}
