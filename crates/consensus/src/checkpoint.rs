//! Deterministic context codec and the durable checkpoint.
//!
//! The checkpoint lets a restarted node rejoin the height it was deciding
//! without violating safety: a commit once sent must survive the crash.
//! The record lives at a single fixed key; any decoding failure is
//! treated as "no saved state" so a corrupt checkpoint never blocks
//! startup.

use crate::context::Context;
use crate::payload::ConsensusPayload;
use crate::{Error, Result};
use dbft_io::{BinaryWriter, IoError, MemoryReader, Serializable};
use dbft_core::constants::{MAX_TRANSACTIONS_PER_BLOCK, MAX_VALIDATORS};
use dbft_core::{ConsensusData, Transaction, UInt160, UInt256};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Store prefix under which the checkpoint record lives.
pub const STORE_PREFIX: u8 = 0xF4;

/// Encodes the context into its deterministic checkpoint layout.
///
/// Validators, slot indices and the snapshot are not encoded; they are
/// rebuilt from the ledger on decode.
pub fn encode(context: &Context, writer: &mut BinaryWriter) {
    writer.write_u32(context.block.version);
    writer.write_u32(context.block.index);
    writer.write_u64(context.block.timestamp);
    writer.write_serializable(&context.block.next_consensus.unwrap_or_default());
    writer.write_serializable(&context.block.consensus_data);
    writer.write_u8(context.view_number);

    let hashes = context.transaction_hashes.as_deref().unwrap_or_default();
    writer.write_u32(hashes.len() as u32);
    for hash in hashes {
        writer.write_serializable(hash);
    }

    match &context.transactions {
        Some(transactions) => {
            writer.write_var_int(transactions.len() as u64);
            for transaction in transactions.values() {
                transaction.serialize(writer);
            }
        }
        None => writer.write_var_int(0),
    }

    write_payload_slots(writer, &context.preparation_payloads);
    write_payload_slots(writer, &context.commit_payloads);
    write_payload_slots(writer, &context.change_view_payloads);
    write_payload_slots(writer, &context.last_change_view_payloads);
}

/// Rebuilds the context from a checkpoint record.
///
/// Starts with a fresh `reset(0)` so block, validators and snapshot come
/// from the ledger, then requires the persisted record to match that
/// state's version and height before filling in the rest.
pub fn decode(context: &mut Context, reader: &mut MemoryReader<'_>) -> Result<()> {
    context.reset(0)?;

    let version = reader.read_u32()?;
    if version != context.block.version {
        return Err(Error::VersionMismatch {
            persisted: version,
            current: context.block.version,
        });
    }
    let index = reader.read_u32()?;
    if index != context.block.index {
        return Err(Error::StateMismatch {
            persisted: index,
            current: context.block.index,
        });
    }

    context.block.timestamp = reader.read_u64()?;
    let next_consensus = <UInt160 as Serializable>::deserialize(reader)?;
    context.block.next_consensus = (!next_consensus.is_zero()).then_some(next_consensus);
    context.block.consensus_data = <ConsensusData as Serializable>::deserialize(reader)?;
    context.view_number = reader.read_u8()?;

    let hash_count = reader.read_u32()? as usize;
    if hash_count > MAX_TRANSACTIONS_PER_BLOCK {
        return Err(IoError::ValueOutOfRange {
            value: hash_count as u64,
            max: MAX_TRANSACTIONS_PER_BLOCK as u64,
        }
        .into());
    }
    let mut hashes = Vec::with_capacity(hash_count);
    for _ in 0..hash_count {
        hashes.push(<UInt256 as Serializable>::deserialize(reader)?);
    }
    context.transaction_hashes = (!hashes.is_empty()).then_some(hashes);

    let transactions: Vec<Transaction> =
        dbft_io::helper::deserialize_array(reader, MAX_TRANSACTIONS_PER_BLOCK)?;
    // The mapping may lag the hash list: a backup checkpoints as soon as
    // the proposal arrives, before every transaction has been fetched.
    // Coverage is enforced at assembly time instead.
    context.transactions = context.transaction_hashes.as_ref().map(|_| {
        transactions
            .into_iter()
            .map(|transaction| (transaction.hash(), transaction))
            .collect::<IndexMap<UInt256, Transaction>>()
    });

    let n = context.validator_count();
    context.preparation_payloads = read_payload_slots(reader, n)?;
    context.commit_payloads = read_payload_slots(reader, n)?;
    context.change_view_payloads = read_payload_slots(reader, n)?;
    context.last_change_view_payloads = read_payload_slots(reader, n)?;
    Ok(())
}

fn write_payload_slots(writer: &mut BinaryWriter, slots: &[Option<ConsensusPayload>]) {
    writer.write_var_int(slots.len() as u64);
    for slot in slots {
        match slot {
            Some(payload) => {
                writer.write_bool(true);
                payload.serialize(writer);
            }
            None => writer.write_bool(false),
        }
    }
}

fn read_payload_slots(
    reader: &mut MemoryReader<'_>,
    expected: usize,
) -> Result<Vec<Option<ConsensusPayload>>> {
    let count = reader.read_var_int(MAX_VALIDATORS as u64)? as usize;
    if count != expected {
        return Err(Error::InvalidMessage(format!(
            "checkpoint has {count} payload slots, validator set has {expected}"
        )));
    }
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let present = reader.read_bool()?;
        slots.push(if present {
            Some(<ConsensusPayload as Serializable>::deserialize(reader)?)
        } else {
            None
        });
    }
    Ok(slots)
}

impl Context {
    /// Serialized checkpoint size, via a dry-run encode.
    pub fn size(&self) -> usize {
        let mut writer = BinaryWriter::new();
        encode(self, &mut writer);
        writer.len()
    }

    /// Encodes the context into a byte vector.
    pub fn to_checkpoint_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        encode(self, &mut writer);
        writer.into_bytes()
    }

    /// Persists the context to the durable store.
    ///
    /// The write carries an fsync-class barrier; once this returns, the
    /// state survives a crash.
    pub fn save(&self) {
        let bytes = self.to_checkpoint_bytes();
        self.store.put_sync(STORE_PREFIX, &[], &bytes);
        debug!(
            height = self.block.index,
            view = self.view_number,
            bytes = bytes.len(),
            "context checkpoint saved"
        );
    }

    /// Restores the last persisted context, if one matches the current
    /// chain height.
    ///
    /// Returns true when state was restored and the caller may resume the
    /// round. Missing, corrupt, or stale records all yield false with the
    /// context left freshly reset; a bad checkpoint never blocks startup.
    pub fn load(&mut self) -> bool {
        let Some(data) = self.store.get(STORE_PREFIX, &[]) else {
            return false;
        };
        let mut reader = MemoryReader::new(&data);
        match decode(self, &mut reader) {
            Ok(()) => {
                debug!(
                    height = self.block.index,
                    view = self.view_number,
                    "context checkpoint restored"
                );
                true
            }
            Err(error) => {
                warn!(%error, "discarding unusable consensus checkpoint");
                // Leave a clean slate rather than a half-decoded state.
                if let Err(error) = self.reset(0) {
                    warn!(%error, "reset after checkpoint discard failed");
                }
                false
            }
        }
    }
}
