//! Transactions as the consensus context sees them.

use crate::constants::MAX_SCRIPT_SIZE;
use crate::{crypto, UInt256, Witness};
use dbft_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum witnesses a transaction may carry.
const MAX_TX_WITNESSES: usize = 16;

/// A transaction drawn from the memory pool into a block proposal.
///
/// The consensus context never executes transactions; it orders them,
/// hashes them, and carries them through the proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Format version.
    pub version: u8,

    /// Sender-chosen entropy making equal scripts distinct.
    pub nonce: u32,

    /// Execution fee, in the smallest fee unit.
    pub system_fee: i64,

    /// Relay fee, in the smallest fee unit.
    pub network_fee: i64,

    /// Last block height at which this transaction may be included.
    pub valid_until_block: u32,

    /// The invocation script to execute.
    pub script: Vec<u8>,

    /// Authorizing witnesses.
    pub witnesses: Vec<Witness>,

    #[serde(skip)]
    hash: OnceLock<UInt256>,
}

impl Transaction {
    /// Creates a transaction with the given payload fields and no witnesses.
    pub fn new(version: u8, nonce: u32, valid_until_block: u32, script: Vec<u8>) -> Self {
        Self {
            version,
            nonce,
            system_fee: 0,
            network_fee: 0,
            valid_until_block,
            script,
            witnesses: Vec::new(),
            hash: OnceLock::new(),
        }
    }

    /// The transaction hash: double SHA-256 of the unsigned encoding.
    ///
    /// Computed once and cached; transactions are immutable once pooled.
    pub fn hash(&self) -> UInt256 {
        *self.hash.get_or_init(|| {
            let mut writer = BinaryWriter::new();
            self.serialize_unsigned(&mut writer);
            crypto::hash256(&writer.into_bytes())
        })
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.version);
        writer.write_u32(self.nonce);
        writer.write_i64(self.system_fee);
        writer.write_i64(self.network_fee);
        writer.write_u32(self.valid_until_block);
        writer.write_var_bytes(&self.script);
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.nonce == other.nonce
            && self.system_fee == other.system_fee
            && self.network_fee == other.network_fee
            && self.valid_until_block == other.valid_until_block
            && self.script == other.script
            && self.witnesses == other.witnesses
    }
}

impl Eq for Transaction {}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        1 + 4 + 8 + 8 + 4
            + helper::get_var_bytes_size(&self.script)
            + helper::get_array_size(&self.witnesses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        self.serialize_unsigned(writer);
        helper::serialize_array(&self.witnesses, writer);
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u8()?;
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        let valid_until_block = reader.read_u32()?;
        let script = reader.read_var_bytes(MAX_SCRIPT_SIZE)?;
        let witnesses = helper::deserialize_array(reader, MAX_TX_WITNESSES)?;
        Ok(Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            script,
            witnesses,
            hash: OnceLock::new(),
        })
    }
}
