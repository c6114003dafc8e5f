//! Blocks, headers, and the consensus data they commit to.

use crate::constants::SIGNATURE_SIZE;
use crate::{crypto, KeyPair, PublicKey, Transaction, UInt160, UInt256, Witness};
use dbft_io::{BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use serde::{Deserialize, Serialize};

/// Consensus metadata committed into every block: which validator led the
/// view that produced it, and the proposal nonce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusData {
    /// Index of the primary validator for the producing view.
    pub primary_index: u32,

    /// Proposal nonce drawn by the primary.
    pub nonce: u64,
}

impl ConsensusData {
    /// Creates consensus data for the given primary, nonce still unset.
    pub fn new(primary_index: u32) -> Self {
        Self {
            primary_index,
            nonce: 0,
        }
    }

    /// Hash of the serialized consensus data; the first Merkle leaf.
    pub fn hash(&self) -> UInt256 {
        crypto::hash256(&self.to_array())
    }
}

impl Serializable for ConsensusData {
    fn size(&self) -> usize {
        4 + 8
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.primary_index);
        writer.write_u64(self.nonce);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            primary_index: reader.read_u32()?,
            nonce: reader.read_u64()?,
        })
    }
}

/// A finalized block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Format version.
    pub version: u32,

    /// Hash of the parent block.
    pub prev_hash: UInt256,

    /// Merkle root over consensus data and transaction hashes.
    pub merkle_root: UInt256,

    /// Block time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Block height.
    pub index: u32,

    /// Consensus metadata.
    pub consensus_data: ConsensusData,

    /// Script hash of the next height's validator committee.
    pub next_consensus: UInt160,

    /// The committee witness; empty until the block is assembled.
    pub witness: Witness,
}

impl Header {
    /// The bytes a commit signature covers: everything except the witness.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_u32(self.version);
        writer.write_serializable(&self.prev_hash);
        writer.write_serializable(&self.merkle_root);
        writer.write_u64(self.timestamp);
        writer.write_u32(self.index);
        writer.write_serializable(&self.consensus_data);
        writer.write_serializable(&self.next_consensus);
        writer.into_bytes()
    }

    /// The header hash: double SHA-256 of the unsigned data.
    pub fn hash(&self) -> UInt256 {
        crypto::hash256(&self.unsigned_data())
    }

    /// A validator's commit signature over this header.
    pub fn sign(&self, key_pair: &KeyPair) -> [u8; SIGNATURE_SIZE] {
        key_pair.sign(&self.unsigned_data())
    }

    /// Checks a validator's commit signature over this header.
    pub fn verify_signature(&self, public_key: &PublicKey, signature: &[u8]) -> bool {
        public_key.verify(&self.unsigned_data(), signature)
    }
}

impl Serializable for Header {
    fn size(&self) -> usize {
        4 + 32 + 32 + 8 + 4 + self.consensus_data.size() + 20 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.unsigned_data());
        writer.write_serializable(&self.witness);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            version: reader.read_u32()?,
            prev_hash: <UInt256 as Serializable>::deserialize(reader)?,
            merkle_root: <UInt256 as Serializable>::deserialize(reader)?,
            timestamp: reader.read_u64()?,
            index: reader.read_u32()?,
            consensus_data: <ConsensusData as Serializable>::deserialize(reader)?,
            next_consensus: <UInt160 as Serializable>::deserialize(reader)?,
            witness: <Witness as Serializable>::deserialize(reader)?,
        })
    }
}

/// The block under construction during a consensus round.
///
/// Optional fields start empty and are filled as the round progresses:
/// the Merkle root once the transaction set is fixed, the witness and the
/// transaction list once a quorum of commits is assembled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Format version.
    pub version: u32,

    /// Hash of the parent block.
    pub prev_hash: UInt256,

    /// Merkle root; None until the transaction set is fixed.
    pub merkle_root: Option<UInt256>,

    /// Block time in milliseconds; zero until the proposal is made.
    pub timestamp: u64,

    /// Block height being decided.
    pub index: u32,

    /// Consensus metadata for the current view.
    pub consensus_data: ConsensusData,

    /// Script hash of the next height's committee; None before reset.
    pub next_consensus: Option<UInt160>,

    /// The committee witness; None until assembly.
    pub witness: Option<Witness>,

    /// The full transaction list; None until assembly.
    pub transactions: Option<Vec<Transaction>>,
}

impl Block {
    /// Starts a block skeleton for the given height.
    pub fn skeleton(prev_hash: UInt256, index: u32, next_consensus: UInt160) -> Self {
        Self {
            version: 0,
            prev_hash,
            merkle_root: None,
            timestamp: 0,
            index,
            consensus_data: ConsensusData::default(),
            next_consensus: Some(next_consensus),
            witness: None,
            transactions: None,
        }
    }

    /// Projects the block onto a [`Header`], zero-filling unset fields.
    pub fn header(&self) -> Header {
        Header {
            version: self.version,
            prev_hash: self.prev_hash,
            merkle_root: self.merkle_root.unwrap_or_default(),
            timestamp: self.timestamp,
            index: self.index,
            consensus_data: self.consensus_data,
            next_consensus: self.next_consensus.unwrap_or_default(),
            witness: self.witness.clone().unwrap_or_default(),
        }
    }

    /// The bytes a commit signature covers.
    pub fn unsigned_header_data(&self) -> Vec<u8> {
        self.header().unsigned_data()
    }

    /// The block hash, equal to the hash of its header.
    pub fn hash(&self) -> UInt256 {
        self.header().hash()
    }
}
