//! Outbound payload construction.

use crate::context::Context;
use crate::messages::{
    ChangeView, ChangeViewReason, Commit, ConsensusMessage, MessagePayload, PrepareRequest,
    PrepareResponse, RecoveryRequest,
};
use crate::payload::ConsensusPayload;
use crate::recovery::{ChangeViewCompact, CommitCompact, PreparationCompact, RecoveryMessage};
use crate::{Error, Result};
use dbft_core::{Contract, Transaction, UInt256};
use indexmap::IndexMap;
use tracing::warn;

impl Context {
    /// Builds, signs and stores a ChangeView asking for the next view.
    pub fn make_change_view(&mut self, reason: ChangeViewReason) -> Result<ConsensusPayload> {
        let my_index = self.require_validator()?;
        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::ChangeView(ChangeView {
                new_view_number: self.view_number.wrapping_add(1),
                timestamp: self.clock.now_ms(),
                reason,
            }),
        );
        let payload = self.make_signed_payload(message, my_index);
        self.change_view_payloads[my_index] = Some(payload.clone());
        Ok(payload)
    }

    /// Builds, signs and stores this primary's block proposal.
    ///
    /// Draws the proposal nonce (plain PRNG: safety rests on signatures,
    /// not nonce entropy), pulls verified transactions from the memory
    /// pool, runs them through the registered policies in order, and
    /// stamps the block with a timestamp strictly after the parent's.
    pub fn make_prepare_request(&mut self) -> Result<ConsensusPayload> {
        debug_assert!(self.is_primary(), "make_prepare_request on a non-primary");
        let my_index = self.require_validator()?;
        if !self.is_primary() {
            return Err(Error::invalid_state("only the primary proposes"));
        }

        let nonce: u64 = rand::random();
        let mut transactions = self.snapshot_ref()?.sorted_verified_transactions();
        for policy in &self.policies {
            transactions = policy.filter_for_block(transactions);
        }

        let hashes: Vec<UInt256> = transactions.iter().map(Transaction::hash).collect();
        let mapping: IndexMap<UInt256, Transaction> = transactions
            .into_iter()
            .map(|transaction| (transaction.hash(), transaction))
            .collect();
        self.transaction_hashes = Some(hashes.clone());
        self.transactions = Some(mapping);

        let prev_timestamp = self.prev_header()?.timestamp;
        self.block.timestamp = self.clock.now_ms().max(prev_timestamp + 1);
        self.block.consensus_data.nonce = nonce;

        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::PrepareRequest(PrepareRequest {
                timestamp: self.block.timestamp,
                nonce,
                transaction_hashes: hashes,
            }),
        );
        let payload = self.make_signed_payload(message, my_index);
        self.preparation_payloads[my_index] = Some(payload.clone());
        Ok(payload)
    }

    /// Builds, signs and stores this backup's endorsement of the primary's
    /// proposal, identified by the PrepareRequest payload hash.
    pub fn make_prepare_response(&mut self) -> Result<ConsensusPayload> {
        let my_index = self.require_validator()?;
        let primary = self.block.consensus_data.primary_index as usize;
        let preparation_hash = self
            .preparation_payloads
            .get(primary)
            .and_then(|slot| slot.as_ref())
            .map(ConsensusPayload::hash)
            .ok_or_else(|| Error::invalid_state("no prepare request to respond to"))?;

        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::PrepareResponse(PrepareResponse { preparation_hash }),
        );
        let payload = self.make_signed_payload(message, my_index);
        self.preparation_payloads[my_index] = Some(payload.clone());
        Ok(payload)
    }

    /// Builds, signs and stores this node's Commit over the block header.
    ///
    /// Idempotent: once a commit exists for this node it is returned
    /// unchanged, whatever the current view.
    pub fn make_commit(&mut self) -> Result<ConsensusPayload> {
        let my_index = self.require_validator()?;
        if let Some(existing) = &self.commit_payloads[my_index] {
            return Ok(existing.clone());
        }

        let key_pair = self
            .key_pair
            .clone()
            .ok_or_else(|| Error::invalid_state("no signing key for commit"))?;
        if self.ensure_header().is_none() {
            return Err(Error::invalid_state("no transaction set to commit to"));
        }
        let signature = self.block.header().sign(&key_pair);

        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::Commit(Commit { signature }),
        );
        let payload = self.make_signed_payload(message, my_index);
        self.commit_payloads[my_index] = Some(payload.clone());
        Ok(payload)
    }

    /// Builds and signs a request for recovery data from peers.
    pub fn make_recovery_request(&mut self) -> Result<ConsensusPayload> {
        let my_index = self.require_validator()?;
        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::RecoveryRequest(RecoveryRequest {
                timestamp: self.clock.now_ms(),
            }),
        );
        Ok(self.make_signed_payload(message, my_index))
    }

    /// Builds and signs a bundle reconstructing this node's consensus view.
    ///
    /// Takes at most M change-view compacts but every stored preparation:
    /// the change-views are evidence, the preparations are the quorum
    /// being handed over. Commits are bundled only once this node has
    /// itself committed.
    pub fn make_recovery_message(&mut self) -> Result<ConsensusPayload> {
        let my_index = self.require_validator()?;

        let m = self.required_signatures();
        let change_view_messages: Vec<ChangeViewCompact> = self
            .last_change_view_payloads
            .iter()
            .flatten()
            .filter_map(ChangeViewCompact::from_payload)
            .take(m)
            .collect();

        let prepare_request = self.transaction_hashes.as_ref().map(|hashes| PrepareRequest {
            timestamp: self.block.timestamp,
            nonce: self.block.consensus_data.nonce,
            transaction_hashes: hashes.clone(),
        });

        let preparation_hash = if prepare_request.is_some() {
            None
        } else {
            self.elect_preparation_hash()
        };

        let preparation_messages: Vec<PreparationCompact> = self
            .preparation_payloads
            .iter()
            .flatten()
            .map(PreparationCompact::from_payload)
            .collect();

        let commit_messages: Vec<CommitCompact> = if self.commit_sent() {
            self.commit_payloads
                .iter()
                .flatten()
                .filter_map(CommitCompact::from_payload)
                .collect()
        } else {
            Vec::new()
        };

        let message = ConsensusMessage::new(
            self.view_number,
            MessagePayload::RecoveryMessage(RecoveryMessage {
                change_view_messages,
                prepare_request,
                preparation_hash,
                preparation_messages,
                commit_messages,
            }),
        );
        Ok(self.make_signed_payload(message, my_index))
    }

    /// The proposal hash backed by the most stored PrepareResponses;
    /// earliest slot wins ties.
    fn elect_preparation_hash(&self) -> Option<UInt256> {
        let mut counts: IndexMap<UInt256, usize> = IndexMap::new();
        for payload in self.preparation_payloads.iter().flatten() {
            if let MessagePayload::PrepareResponse(response) = &payload.message.payload {
                *counts.entry(response.preparation_hash).or_default() += 1;
            }
        }
        let mut elected: Option<(UInt256, usize)> = None;
        for (hash, count) in counts {
            if elected.map_or(true, |(_, best)| count > best) {
                elected = Some((hash, count));
            }
        }
        elected.map(|(hash, _)| hash)
    }

    fn require_validator(&self) -> Result<usize> {
        self.my_index
            .ok_or_else(|| Error::invalid_state("operation requires a validator slot"))
    }

    /// Wraps a message in the common envelope and asks the wallet for a
    /// witness. On an operational signing failure the payload is returned
    /// unsigned; [`ConsensusPayload::is_signed`] tells the service whether
    /// it may be broadcast.
    fn make_signed_payload(&self, message: ConsensusMessage, my_index: usize) -> ConsensusPayload {
        let mut payload = ConsensusPayload::new(
            self.block.version,
            self.block.prev_hash,
            self.block.index,
            my_index as u16,
            message,
        );
        self.sign_payload(&mut payload);
        payload
    }

    fn sign_payload(&self, payload: &mut ConsensusPayload) -> bool {
        let (Some(wallet), Some(key_pair)) = (&self.wallet, &self.key_pair) else {
            return false;
        };
        match wallet.sign(&payload.unsigned_data(), key_pair) {
            Ok(signature) => {
                let contract = Contract::create_signature_contract(key_pair.public_key());
                match contract.create_witness(&[signature]) {
                    Ok(witness) => {
                        payload.witness = witness;
                        true
                    }
                    Err(error) => {
                        warn!(%error, "witness construction failed; payload left unsigned");
                        false
                    }
                }
            }
            Err(error) => {
                warn!(%error, "payload signing failed; payload left unsigned");
                false
            }
        }
    }
}
