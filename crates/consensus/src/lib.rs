//! dBFT consensus context.
//!
//! The per-height, per-view state machine a validator maintains while
//! agreeing on the next block: the in-progress proposal, the per-validator
//! message slots, the predicates the surrounding service consults, the
//! factory for outbound payloads, block assembly from a quorum of commits,
//! and a crash-durable checkpoint of the whole state.
//!
//! The context performs no I/O of its own beyond its collaborators
//! ([`providers`]) and is not internally synchronized: it is designed to be
//! owned by a single consensus service actor.

pub mod checkpoint;
pub mod context;
pub mod messages;
pub mod payload;
pub mod providers;
pub mod recovery;
pub mod validators;

mod factory;

pub use context::Context;
pub use messages::{
    ChangeView, ChangeViewReason, Commit, ConsensusMessage, MessagePayload, PrepareRequest,
    PrepareResponse, RecoveryRequest,
};
pub use payload::ConsensusPayload;
pub use providers::{
    Clock, ContextStore, Ledger, LedgerSnapshot, PolicyPlugin, SystemClock, Wallet, WalletAccount,
    WalletError, WalletResult,
};
pub use recovery::{ChangeViewCompact, CommitCompact, PreparationCompact, RecoveryMessage};
pub use validators::{byzantine_threshold, primary_index, quorum_threshold};

use thiserror::Error;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Consensus-specific error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Binary decoding failure.
    #[error("io error: {0}")]
    Io(#[from] dbft_io::IoError),

    /// Chain-primitive failure.
    #[error("core error: {0}")]
    Core(#[from] dbft_core::CoreError),

    /// Wallet failure during signing or account lookup.
    #[error("wallet error: {0}")]
    Wallet(#[from] providers::WalletError),

    /// An operation was called in a state that does not admit it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Block assembly attempted without enough current-view commits.
    #[error("quorum not reached: have {have} commits, need {need}")]
    QuorumNotReached { have: usize, need: usize },

    /// A persisted checkpoint's format version differs from ours.
    #[error("checkpoint version {persisted} does not match block version {current}")]
    VersionMismatch { persisted: u32, current: u32 },

    /// A persisted checkpoint belongs to a different height.
    #[error("checkpoint is for height {persisted}, chain expects {current}")]
    StateMismatch { persisted: u32, current: u32 },

    /// A consensus message violates the wire format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// Convenience constructor for state violations.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }
}
