//! Consensus message types and their wire codec.
//!
//! Every message shares a two-byte prologue (type tag, view number)
//! followed by a type-specific body. The byte layouts here are fixed by
//! the consensus protocol and must stay bit-compatible with peers.

use crate::recovery::RecoveryMessage;
use dbft_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use dbft_core::constants::{MAX_TRANSACTIONS_PER_BLOCK, SIGNATURE_SIZE};
use dbft_core::UInt256;
use serde::{Deserialize, Serialize};

/// A consensus message: the view it was produced in plus its body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    /// View the sender was in when producing this message.
    pub view_number: u8,

    /// The type-specific body.
    pub payload: MessagePayload,
}

/// The six consensus message bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Primary's proposal of a transaction set.
    PrepareRequest(PrepareRequest),
    /// Backup's endorsement of a proposal, by payload hash.
    PrepareResponse(PrepareResponse),
    /// A validator's signature over the proposed header.
    Commit(Commit),
    /// Request to abandon the current view.
    ChangeView(ChangeView),
    /// Solicitation of recovery data from peers.
    RecoveryRequest(RecoveryRequest),
    /// A bundle reconstructing the sender's consensus state.
    RecoveryMessage(RecoveryMessage),
}

impl ConsensusMessage {
    /// Creates a message stamped with the given view.
    pub fn new(view_number: u8, payload: MessagePayload) -> Self {
        Self {
            view_number,
            payload,
        }
    }

    /// The wire type tag of this message.
    pub fn type_byte(&self) -> u8 {
        match &self.payload {
            MessagePayload::PrepareRequest(_) => 0x00,
            MessagePayload::PrepareResponse(_) => 0x01,
            MessagePayload::Commit(_) => 0x02,
            MessagePayload::ChangeView(_) => 0x03,
            MessagePayload::RecoveryRequest(_) => 0x04,
            MessagePayload::RecoveryMessage(_) => 0x05,
        }
    }
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        let body = match &self.payload {
            MessagePayload::PrepareRequest(m) => m.size(),
            MessagePayload::PrepareResponse(m) => m.size(),
            MessagePayload::Commit(m) => m.size(),
            MessagePayload::ChangeView(m) => m.size(),
            MessagePayload::RecoveryRequest(m) => m.size(),
            MessagePayload::RecoveryMessage(m) => m.size(),
        };
        2 + body
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.type_byte());
        writer.write_u8(self.view_number);
        match &self.payload {
            MessagePayload::PrepareRequest(m) => Serializable::serialize(m, writer),
            MessagePayload::PrepareResponse(m) => Serializable::serialize(m, writer),
            MessagePayload::Commit(m) => Serializable::serialize(m, writer),
            MessagePayload::ChangeView(m) => Serializable::serialize(m, writer),
            MessagePayload::RecoveryRequest(m) => Serializable::serialize(m, writer),
            MessagePayload::RecoveryMessage(m) => Serializable::serialize(m, writer),
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        let view_number = reader.read_u8()?;
        let payload = match type_byte {
            0x00 => MessagePayload::PrepareRequest(<PrepareRequest as Serializable>::deserialize(reader)?),
            0x01 => MessagePayload::PrepareResponse(<PrepareResponse as Serializable>::deserialize(reader)?),
            0x02 => MessagePayload::Commit(<Commit as Serializable>::deserialize(reader)?),
            0x03 => MessagePayload::ChangeView(<ChangeView as Serializable>::deserialize(reader)?),
            0x04 => MessagePayload::RecoveryRequest(<RecoveryRequest as Serializable>::deserialize(reader)?),
            0x05 => MessagePayload::RecoveryMessage(<RecoveryMessage as Serializable>::deserialize(reader)?),
            other => {
                return Err(IoError::invalid_data(format!(
                    "unknown consensus message type {other:#04x}"
                )))
            }
        };
        Ok(Self {
            view_number,
            payload,
        })
    }
}

/// Why a validator asked to change view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChangeViewReason {
    /// The view timer expired.
    Timeout = 0x00,
    /// Enough peers already agreed to change.
    ChangeAgreement = 0x01,
    /// A proposed transaction could not be found.
    TxNotFound = 0x02,
    /// A proposed transaction was rejected by policy.
    TxRejectedByPolicy = 0x03,
    /// A proposed transaction failed verification.
    TxInvalid = 0x04,
    /// The proposed block was rejected by policy.
    BlockRejectedByPolicy = 0x05,
}

impl ChangeViewReason {
    /// Decodes a reason byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Timeout),
            0x01 => Some(Self::ChangeAgreement),
            0x02 => Some(Self::TxNotFound),
            0x03 => Some(Self::TxRejectedByPolicy),
            0x04 => Some(Self::TxInvalid),
            0x05 => Some(Self::BlockRejectedByPolicy),
            _ => None,
        }
    }
}

/// Request to abandon the current view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeView {
    /// The view the sender wants to move to.
    pub new_view_number: u8,

    /// Sender's clock at the time of the request, in milliseconds.
    pub timestamp: u64,

    /// Why the sender gave up on the current view.
    pub reason: ChangeViewReason,
}

impl Serializable for ChangeView {
    fn size(&self) -> usize {
        1 + 8 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.new_view_number);
        writer.write_u64(self.timestamp);
        writer.write_u8(self.reason as u8);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let new_view_number = reader.read_u8()?;
        let timestamp = reader.read_u64()?;
        let reason_byte = reader.read_u8()?;
        let reason = ChangeViewReason::from_byte(reason_byte).ok_or_else(|| {
            IoError::invalid_data(format!("unknown change-view reason {reason_byte:#04x}"))
        })?;
        Ok(Self {
            new_view_number,
            timestamp,
            reason,
        })
    }
}

/// The primary's block proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Proposed block timestamp in milliseconds.
    pub timestamp: u64,

    /// Proposal nonce.
    pub nonce: u64,

    /// Ordered hashes of the proposed transaction set.
    pub transaction_hashes: Vec<UInt256>,
}

impl Serializable for PrepareRequest {
    fn size(&self) -> usize {
        8 + 8 + helper::get_array_size(&self.transaction_hashes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.timestamp);
        writer.write_u64(self.nonce);
        helper::serialize_array(&self.transaction_hashes, writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            timestamp: reader.read_u64()?,
            nonce: reader.read_u64()?,
            transaction_hashes: helper::deserialize_array(reader, MAX_TRANSACTIONS_PER_BLOCK)?,
        })
    }
}

/// A backup's endorsement of the primary's proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareResponse {
    /// Hash of the PrepareRequest payload being endorsed.
    pub preparation_hash: UInt256,
}

impl Serializable for PrepareResponse {
    fn size(&self) -> usize {
        32
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_serializable(&self.preparation_hash);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            preparation_hash: <UInt256 as Serializable>::deserialize(reader)?,
        })
    }
}

/// A validator's signature over the proposed block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Raw 64-byte header signature.
    #[serde(with = "hex_signature")]
    pub signature: [u8; SIGNATURE_SIZE],
}

impl Serializable for Commit {
    fn size(&self) -> usize {
        SIGNATURE_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.signature);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            signature: reader.read_array::<SIGNATURE_SIZE>()?,
        })
    }
}

/// Solicitation of recovery data from peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    /// Sender's clock at the time of the request, in milliseconds.
    pub timestamp: u64,
}

impl Serializable for RecoveryRequest {
    fn size(&self) -> usize {
        8
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u64(self.timestamp);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            timestamp: reader.read_u64()?,
        })
    }
}

/// Serde adapter for raw 64-byte signatures (no built-in array impls).
pub(crate) mod hex_signature {
    use dbft_core::constants::SIGNATURE_SIZE;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        signature: &[u8; SIGNATURE_SIZE],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(signature))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; SIGNATURE_SIZE], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbft_io::SerializableExt;

    #[test]
    fn test_type_bytes_are_stable() {
        let cases: Vec<(MessagePayload, u8)> = vec![
            (
                MessagePayload::PrepareRequest(PrepareRequest {
                    timestamp: 0,
                    nonce: 0,
                    transaction_hashes: vec![],
                }),
                0x00,
            ),
            (
                MessagePayload::PrepareResponse(PrepareResponse {
                    preparation_hash: UInt256::zero(),
                }),
                0x01,
            ),
            (
                MessagePayload::Commit(Commit {
                    signature: [0; SIGNATURE_SIZE],
                }),
                0x02,
            ),
            (
                MessagePayload::ChangeView(ChangeView {
                    new_view_number: 1,
                    timestamp: 0,
                    reason: ChangeViewReason::Timeout,
                }),
                0x03,
            ),
            (
                MessagePayload::RecoveryRequest(RecoveryRequest { timestamp: 0 }),
                0x04,
            ),
        ];
        for (payload, expected) in cases {
            assert_eq!(ConsensusMessage::new(0, payload).type_byte(), expected);
        }
    }

    #[test]
    fn test_change_view_roundtrip() {
        let message = ConsensusMessage::new(
            2,
            MessagePayload::ChangeView(ChangeView {
                new_view_number: 3,
                timestamp: 1_700_000_000_123,
                reason: ChangeViewReason::TxNotFound,
            }),
        );
        let decoded = ConsensusMessage::from_array(&message.to_array()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(message.to_array().len(), message.size());
    }

    #[test]
    fn test_prepare_request_roundtrip() {
        let message = ConsensusMessage::new(
            0,
            MessagePayload::PrepareRequest(PrepareRequest {
                timestamp: 1_700_000_000_000,
                nonce: 0xABCD_EF01_2345_6789,
                transaction_hashes: vec![UInt256::from([1u8; 32]), UInt256::from([2u8; 32])],
            }),
        );
        assert_eq!(
            ConsensusMessage::from_array(&message.to_array()).unwrap(),
            message
        );
    }

    #[test]
    fn test_commit_roundtrip() {
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature[0] = 0xFF;
        signature[63] = 0x01;
        let message = ConsensusMessage::new(1, MessagePayload::Commit(Commit { signature }));
        assert_eq!(
            ConsensusMessage::from_array(&message.to_array()).unwrap(),
            message
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ConsensusMessage::from_array(&[0x77, 0x00]).is_err());
    }

    #[test]
    fn test_unknown_reason_rejected() {
        // type=ChangeView, view=0, new_view=1, timestamp=0, reason=0xEE
        let mut bytes = vec![0x03, 0x00, 0x01];
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.push(0xEE);
        assert!(ConsensusMessage::from_array(&bytes).is_err());
    }

    #[test]
    fn test_prepare_request_hash_bound() {
        let message = ConsensusMessage::new(
            0,
            MessagePayload::PrepareRequest(PrepareRequest {
                timestamp: 0,
                nonce: 0,
                transaction_hashes: vec![UInt256::zero(); MAX_TRANSACTIONS_PER_BLOCK + 1],
            }),
        );
        assert!(ConsensusMessage::from_array(&message.to_array()).is_err());
    }
}
