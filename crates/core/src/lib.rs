//! Chain primitives shared by the dBFT consensus stack.
//!
//! Hash integers ([`UInt160`], [`UInt256`]), secp256r1 key material,
//! Merkle root computation, and the verifiable entities the consensus
//! context assembles: transactions, witnesses, blocks, and the
//! multisignature contracts that authorize them.

pub mod block;
pub mod constants;
pub mod contract;
pub mod crypto;
pub mod key_pair;
pub mod merkle;
pub mod public_key;
pub mod transaction;
pub mod uint160;
pub mod uint256;
pub mod witness;

pub use block::{Block, ConsensusData, Header};
pub use contract::{consensus_address, Contract};
pub use key_pair::KeyPair;
pub use merkle::MerkleTree;
pub use public_key::PublicKey;
pub use transaction::Transaction;
pub use uint160::UInt160;
pub use uint256::UInt256;
pub use witness::Witness;

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by chain-primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A byte buffer had the wrong length or shape for the target type.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// Key material was rejected by the curve implementation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A contract could not be built from the given parameters.
    #[error("invalid contract: {0}")]
    InvalidContract(String),

    /// Binary decoding failure.
    #[error("io error: {0}")]
    Io(#[from] dbft_io::IoError),
}

impl CoreError {
    /// Convenience constructor for format violations.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        CoreError::InvalidFormat {
            message: message.into(),
        }
    }
}
