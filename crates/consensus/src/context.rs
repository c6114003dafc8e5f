//! The consensus context: per-height, per-view state and its predicates.

use crate::messages::MessagePayload;
use crate::payload::ConsensusPayload;
use crate::providers::{Clock, ContextStore, Ledger, LedgerSnapshot, PolicyPlugin, Wallet};
use crate::validators::{byzantine_threshold, primary_index, quorum_threshold};
use crate::{Error, Result};
use dbft_core::merkle::MerkleTree;
use dbft_core::{
    consensus_address, Block, ConsensusData, Contract, Header, KeyPair, PublicKey, Transaction,
    UInt256,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The per-height consensus state a validator maintains.
///
/// One context lives for the whole node process; [`Context::reset`] with
/// view 0 begins a height, with a higher view performs a view change.
/// State fields are public because the surrounding service stores inbound
/// payloads directly into the per-validator slots; the context is owned by
/// that single service actor and is not internally synchronized.
///
/// Predicates are computed fresh on every call. Inbound messages mutate
/// the payload arrays between calls, so nothing here is cached.
pub struct Context {
    /// The block under construction.
    pub block: Block,

    /// Current view; 0 at each height start, non-decreasing within a height.
    pub view_number: u8,

    /// Ordered validator set for this height.
    pub validators: Vec<PublicKey>,

    /// This node's slot in `validators`; None when watch-only.
    pub my_index: Option<usize>,

    /// Ordered transaction hashes chosen by the primary; None until a
    /// PrepareRequest is seen.
    pub transaction_hashes: Option<Vec<UInt256>>,

    /// Full transactions covering exactly `transaction_hashes`.
    pub transactions: Option<IndexMap<UInt256, Transaction>>,

    /// One PrepareRequest (primary slot) or PrepareResponse per validator.
    pub preparation_payloads: Vec<Option<ConsensusPayload>>,

    /// One Commit per validator that has committed.
    pub commit_payloads: Vec<Option<ConsensusPayload>>,

    /// Latest ChangeView per validator at the current view.
    pub change_view_payloads: Vec<Option<ConsensusPayload>>,

    /// ChangeViews preserved from prior views as recovery evidence.
    pub last_change_view_payloads: Vec<Option<ConsensusPayload>>,

    /// Highest block index seen per validator; -1 until first contact.
    pub last_seen_message: Vec<i64>,

    pub(crate) snapshot: Option<Box<dyn LedgerSnapshot>>,
    pub(crate) key_pair: Option<KeyPair>,

    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) wallet: Option<Arc<dyn Wallet>>,
    pub(crate) store: Arc<dyn ContextStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policies: Vec<Arc<dyn PolicyPlugin>>,
}

impl Context {
    /// Builds a context bound to its collaborators.
    ///
    /// The context starts empty; call [`Context::reset`] with view 0 (or
    /// [`Context::load`](crate::checkpoint) after a restart) before use.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        wallet: Option<Arc<dyn Wallet>>,
        store: Arc<dyn ContextStore>,
        clock: Arc<dyn Clock>,
        policies: Vec<Arc<dyn PolicyPlugin>>,
    ) -> Self {
        Self {
            block: Block::skeleton(UInt256::zero(), 0, Default::default()),
            view_number: 0,
            validators: Vec::new(),
            my_index: None,
            transaction_hashes: None,
            transactions: None,
            preparation_payloads: Vec::new(),
            commit_payloads: Vec::new(),
            change_view_payloads: Vec::new(),
            last_change_view_payloads: Vec::new(),
            last_seen_message: Vec::new(),
            snapshot: None,
            key_pair: None,
            ledger,
            wallet,
            store,
            clock,
            policies,
        }
    }

    /// Number of validators this height.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// F: the Byzantine fault tolerance of the current set.
    pub fn byzantine_threshold(&self) -> usize {
        byzantine_threshold(self.validator_count())
    }

    /// M: signatures required for a quorum.
    pub fn required_signatures(&self) -> usize {
        quorum_threshold(self.validator_count())
    }

    /// The primary slot for the current view.
    pub fn primary_index(&self) -> u32 {
        self.block.consensus_data.primary_index
    }

    /// Whether this node leads the current view.
    pub fn is_primary(&self) -> bool {
        self.my_index
            .is_some_and(|index| index as u32 == self.block.consensus_data.primary_index)
    }

    /// Whether this node validates but does not lead the current view.
    pub fn is_backup(&self) -> bool {
        self.my_index.is_some() && !self.is_primary()
    }

    /// Whether this node is not a validator this height.
    pub fn watch_only(&self) -> bool {
        self.my_index.is_none()
    }

    /// Number of validators whose Commit is stored, any view.
    pub fn count_committed(&self) -> usize {
        self.commit_payloads.iter().flatten().count()
    }

    /// Number of validators not heard from since the previous height.
    pub fn count_failed(&self) -> usize {
        let threshold = self.block.index as i64 - 1;
        self.last_seen_message
            .iter()
            .filter(|&&seen| seen < threshold)
            .count()
    }

    /// Whether the primary's PrepareRequest was sent or received.
    pub fn request_sent_or_received(&self) -> bool {
        self.preparation_payloads
            .get(self.block.consensus_data.primary_index as usize)
            .is_some_and(Option::is_some)
    }

    /// Whether this node's own preparation is stored.
    pub fn response_sent(&self) -> bool {
        self.my_index
            .is_some_and(|index| self.preparation_payloads[index].is_some())
    }

    /// Whether this node's own Commit is stored.
    pub fn commit_sent(&self) -> bool {
        self.my_index
            .is_some_and(|index| self.commit_payloads[index].is_some())
    }

    /// Whether the final block has been assembled.
    pub fn block_sent(&self) -> bool {
        self.block.transactions.is_some()
    }

    /// Whether this node has asked to move past the current view.
    pub fn view_changing(&self) -> bool {
        let Some(index) = self.my_index else {
            return false;
        };
        match self.change_view_payloads[index].as_ref() {
            Some(payload) => match &payload.message.payload {
                MessagePayload::ChangeView(cv) => cv.new_view_number > self.view_number,
                _ => false,
            },
            None => false,
        }
    }

    /// Whether more than F validators have committed or fallen behind.
    ///
    /// Past this point a view change can no longer gather a quorum: the
    /// committed nodes are locked and the lost ones are silent.
    pub fn more_than_f_nodes_committed_or_lost(&self) -> bool {
        self.count_committed() + self.count_failed() > self.byzantine_threshold()
    }

    /// Whether this node, while changing view, must still refuse payloads.
    ///
    /// Once more than F nodes are committed or lost, a node wishing to
    /// change view must resume accepting payloads or the network stalls.
    pub fn not_accepting_payloads_due_to_view_changing(&self) -> bool {
        self.view_changing() && !self.more_than_f_nodes_committed_or_lost()
    }

    /// Slot of the given validator key, if present this height.
    pub fn validator_index_of(&self, public_key: &PublicKey) -> Option<u16> {
        self.validators
            .iter()
            .position(|validator| validator == public_key)
            .map(|index| index as u16)
    }

    /// The ledger snapshot for the current height, if one is held.
    pub fn snapshot(&self) -> Option<&dyn LedgerSnapshot> {
        self.snapshot.as_deref()
    }

    pub(crate) fn snapshot_ref(&self) -> Result<&dyn LedgerSnapshot> {
        self.snapshot
            .as_deref()
            .ok_or_else(|| Error::invalid_state("no ledger snapshot; reset(0) not called"))
    }

    /// Header of the parent block.
    pub fn prev_header(&self) -> Result<Header> {
        let snapshot = self.snapshot_ref()?;
        snapshot
            .get_header(&self.block.prev_hash)
            .ok_or_else(|| Error::invalid_state("parent header not found in ledger"))
    }

    /// Re-initializes the context for a height start (view 0) or a view
    /// bump (view > 0).
    ///
    /// A height start releases the prior snapshot, acquires a fresh one,
    /// rebuilds the block skeleton and validator set, and rediscovers this
    /// node's slot and key. A view bump preserves cross-view evidence:
    /// ChangeViews targeting a view at or past the new one move into
    /// `last_change_view_payloads`. Commit slots are never cleared within
    /// a height; stale-view commits are excluded at assembly instead.
    pub fn reset(&mut self, view_number: u8) -> Result<()> {
        if view_number == 0 {
            // Release before reacquiring so the ledger never sees two
            // live snapshots from one context.
            self.snapshot = None;
            let snapshot = self.ledger.snapshot();

            let validators = snapshot.next_block_validators();
            if validators.is_empty() {
                return Err(Error::invalid_state("ledger returned an empty validator set"));
            }
            let next_consensus = consensus_address(&validators)?;
            self.block = Block::skeleton(
                snapshot.current_block_hash(),
                snapshot.height() + 1,
                next_consensus,
            );
            self.validators = validators;

            let n = self.validators.len();
            self.change_view_payloads = vec![None; n];
            self.last_change_view_payloads = vec![None; n];
            self.commit_payloads = vec![None; n];
            // Survives height changes; reallocated only when the
            // validator-set size moves.
            if self.last_seen_message.len() != n {
                self.last_seen_message = vec![-1; n];
            }

            self.my_index = None;
            self.key_pair = None;
            if let Some(wallet) = self.wallet.clone() {
                for (index, validator) in self.validators.iter().enumerate() {
                    let Some(account) = wallet.account(validator) else {
                        continue;
                    };
                    if !account.has_key() {
                        continue;
                    }
                    self.my_index = Some(index);
                    self.key_pair = account.into_key();
                    break;
                }
            }

            self.snapshot = Some(snapshot);
        } else {
            for index in 0..self.last_change_view_payloads.len() {
                let carried = self.change_view_payloads[index]
                    .as_ref()
                    .filter(|payload| match &payload.message.payload {
                        MessagePayload::ChangeView(cv) => cv.new_view_number >= view_number,
                        _ => false,
                    })
                    .cloned();
                self.last_change_view_payloads[index] = carried;
            }
        }

        self.view_number = view_number;
        let n = self.validator_count();
        self.block.consensus_data =
            ConsensusData::new(primary_index(self.block.index, view_number, n));
        self.block.merkle_root = None;
        self.block.timestamp = 0;
        self.block.transactions = None;
        self.transaction_hashes = None;
        self.transactions = None;
        self.preparation_payloads = vec![None; n];
        if let Some(index) = self.my_index {
            self.last_seen_message[index] = self.block.index as i64;
        }

        debug!(
            height = self.block.index,
            view = view_number,
            primary = self.block.consensus_data.primary_index,
            my_index = ?self.my_index,
            "context reset"
        );
        Ok(())
    }

    /// Materializes the block header once the transaction set is fixed.
    ///
    /// Computes the Merkle root over the consensus-data hash followed by
    /// the transaction hashes, once; repeated calls are idempotent.
    /// Returns None while no transaction set is known.
    pub fn ensure_header(&mut self) -> Option<&Block> {
        self.transaction_hashes.as_ref()?;
        if self.block.merkle_root.is_none() {
            let root = {
                let hashes = self.transaction_hashes.as_deref().unwrap_or_default();
                let mut leaves = Vec::with_capacity(1 + hashes.len());
                leaves.push(self.block.consensus_data.hash());
                leaves.extend_from_slice(hashes);
                MerkleTree::compute_root(&leaves)
            };
            self.block.merkle_root = Some(root);
        }
        Some(&self.block)
    }

    /// Assembles the final block from a quorum of current-view commits.
    ///
    /// Walks validators in order, taking signatures from commit slots
    /// whose message view matches the current view, until M signatures
    /// are gathered; installs the M-of-N witness and the ordered
    /// transaction list.
    pub fn create_block(&mut self) -> Result<Block> {
        if self.ensure_header().is_none() {
            return Err(Error::invalid_state("no transaction set to assemble"));
        }

        let m = self.required_signatures();
        let mut signatures = Vec::with_capacity(m);
        for payload in self.commit_payloads.iter().flatten() {
            if signatures.len() == m {
                break;
            }
            if payload.message.view_number != self.view_number {
                continue;
            }
            if let MessagePayload::Commit(commit) = &payload.message.payload {
                signatures.push(commit.signature);
            }
        }
        if signatures.len() < m {
            return Err(Error::QuorumNotReached {
                have: signatures.len(),
                need: m,
            });
        }

        let contract = Contract::create_multi_sig_contract(m, &self.validators)?;
        self.block.witness = Some(contract.create_witness(&signatures)?);

        let hashes = self.transaction_hashes.as_deref().unwrap_or_default();
        let transactions = self.transactions.as_ref().ok_or_else(|| {
            Error::invalid_state("transaction mapping missing while hashes are present")
        })?;
        let ordered = hashes
            .iter()
            .map(|hash| transactions.get(hash).cloned())
            .collect::<Option<Vec<Transaction>>>()
            .ok_or_else(|| Error::invalid_state("transaction set does not cover all hashes"))?;
        self.block.transactions = Some(ordered);

        info!(
            height = self.block.index,
            view = self.view_number,
            tx_count = hashes.len(),
            "block assembled"
        );
        Ok(self.block.clone())
    }

    /// Releases the ledger snapshot without tearing the context down.
    ///
    /// Dropping the context releases it too; this exists for services
    /// that park a context while keeping the allocation alive.
    pub fn dispose(&mut self) {
        self.snapshot = None;
    }
}
