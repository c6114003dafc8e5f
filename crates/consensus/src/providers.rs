//! Collaborator contracts consumed by the consensus context.
//!
//! The context drives no I/O and owns no clocks; the ledger, wallet,
//! durable store, time source, and transaction policies are handed in as
//! trait objects at construction. This keeps the state machine
//! deterministic under test: every ambient dependency has an injectable
//! seam.

use dbft_core::constants::SIGNATURE_SIZE;
use dbft_core::{Header, KeyPair, PublicKey, Transaction, UInt256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type for wallet operations.
pub type WalletResult<T> = std::result::Result<T, WalletError>;

/// Errors a wallet may raise while signing.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The wallet holds no private key for the requested account.
    #[error("no private key for account")]
    MissingKey,

    /// The wallet refused to sign (locked store, hardware failure, ...).
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Read access to the chain at a fixed parent block.
///
/// A snapshot is acquired when a height begins and stays consistent for the
/// whole height: `height()` and `current_block_hash()` never move under the
/// context's feet.
pub trait LedgerSnapshot {
    /// Hash of the snapshot's tip block.
    fn current_block_hash(&self) -> UInt256;

    /// Height of the snapshot's tip block.
    fn height(&self) -> u32;

    /// Looks up a header by block hash.
    fn get_header(&self, hash: &UInt256) -> Option<Header>;

    /// The validator set for the block after the tip.
    fn next_block_validators(&self) -> Vec<PublicKey>;

    /// Verified transactions from the memory pool, in fee-priority order.
    fn sorted_verified_transactions(&self) -> Vec<Transaction>;
}

/// The chain itself, from which per-height snapshots are taken.
pub trait Ledger {
    /// Acquires a read-consistent snapshot at the current tip.
    fn snapshot(&self) -> Box<dyn LedgerSnapshot>;
}

/// An account known to a wallet, with or without signing capability.
pub struct WalletAccount {
    public_key: PublicKey,
    key_pair: Option<KeyPair>,
}

impl WalletAccount {
    /// A watch-only account.
    pub fn watch_only(public_key: PublicKey) -> Self {
        Self {
            public_key,
            key_pair: None,
        }
    }

    /// An account whose private key the wallet holds.
    pub fn with_key(key_pair: KeyPair) -> Self {
        Self {
            public_key: *key_pair.public_key(),
            key_pair: Some(key_pair),
        }
    }

    /// The account's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Whether the wallet can sign for this account.
    pub fn has_key(&self) -> bool {
        self.key_pair.is_some()
    }

    /// Takes the signing key, if held.
    pub fn into_key(self) -> Option<KeyPair> {
        self.key_pair
    }
}

/// Signing interface over a keystore.
pub trait Wallet {
    /// Looks up the account for a public key, if the wallet knows it.
    fn account(&self, public_key: &PublicKey) -> Option<WalletAccount>;

    /// Signs `data` with the given key pair.
    ///
    /// The default implementation signs in-process; keystores backed by
    /// external signers override this and may fail operationally.
    fn sign(&self, data: &[u8], key_pair: &KeyPair) -> WalletResult<[u8; SIGNATURE_SIZE]> {
        Ok(key_pair.sign(data))
    }
}

/// Durable key-value storage for the context checkpoint.
///
/// `put_sync` must not return before the write is crash-durable.
pub trait ContextStore {
    /// Reads the value at `(prefix, key)`, if present.
    fn get(&self, prefix: u8, key: &[u8]) -> Option<Vec<u8>>;

    /// Writes `(prefix, key) -> value` with an fsync-class barrier.
    fn put_sync(&self, prefix: u8, key: &[u8], value: &[u8]);
}

/// Injectable time source.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A transaction policy applied to block proposals.
///
/// Policies compose left-to-right in registration order; each sees the
/// previous policy's output and may only reduce or reorder it.
pub trait PolicyPlugin {
    /// Filters the candidate transaction list for the next proposal.
    fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction>;
}
