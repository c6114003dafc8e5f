//! Context state machine tests: reset semantics, predicates, the message
//! factory, and block assembly.

mod common;

use common::*;
use dbft_consensus::{
    byzantine_threshold, quorum_threshold, ChangeViewReason, Context, Error, MessagePayload,
    PolicyPlugin, Wallet,
};
use dbft_core::consensus_address;
use dbft_io::SerializableExt;
use std::sync::Arc;

#[test]
fn reset_zero_starts_a_fresh_height() {
    let (mut context, _env) = make_context(7, 99, Some(2));
    context.reset(0).unwrap();

    assert_eq!(context.view_number, 0);
    assert_eq!(context.block.index, 100);
    assert_eq!(context.validator_count(), 7);
    assert_eq!(context.my_index, Some(2));
    assert!(context.preparation_payloads.iter().all(Option::is_none));
    assert!(context.commit_payloads.iter().all(Option::is_none));
    assert!(context.transaction_hashes.is_none());
    assert!(context.transactions.is_none());
    assert!(context.snapshot().is_some());

    // Height 100 at view 0 in a set of 7 is led by slot 100 % 7 = 2.
    assert_eq!(context.primary_index(), 2);
    assert!(context.is_primary());
    assert!(!context.is_backup());
    assert!(!context.watch_only());

    // The committee address matches the ledger's validator set.
    assert_eq!(
        context.block.next_consensus,
        Some(consensus_address(&context.validators).unwrap())
    );

    // Own liveness mark is stamped at the current height.
    assert_eq!(context.last_seen_message[2], 100);
}

#[test]
fn primary_rotates_backwards_across_views() {
    let (mut context, _env) = make_context(7, 99, Some(2));
    // Height 100, views 0..=6: primaries 2, 1, 0, 6, 5, 4, 3.
    let expected = [2u32, 1, 0, 6, 5, 4, 3];
    context.reset(0).unwrap();
    for (view, want) in expected.iter().enumerate() {
        if view > 0 {
            context.reset(view as u8).unwrap();
        }
        assert_eq!(context.primary_index(), *want, "view {view}");
        assert_eq!(
            context.block.consensus_data.primary_index,
            (context.block.index as i64 - view as i64).rem_euclid(7) as u32
        );
    }
}

#[test]
fn watch_only_node_has_no_slot_and_no_factory() {
    let (mut context, _env) = make_context(4, 99, None);
    context.reset(0).unwrap();

    assert!(context.watch_only());
    assert!(!context.is_primary());
    assert!(!context.is_backup());
    assert!(!context.view_changing());
    assert!(matches!(
        context.make_change_view(ChangeViewReason::Timeout),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn view_bump_preserves_change_view_evidence() {
    let (mut context, env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();

    // Peers asked for views [3, 2, 4, 2].
    let new_views = [3u8, 2, 4, 2];
    for (slot, new_view) in new_views.iter().enumerate() {
        context.change_view_payloads[slot] = Some(change_view_payload(
            &context,
            &env.keys[slot],
            slot as u16,
            0,
            *new_view,
        ));
    }

    context.reset(3).unwrap();

    // Only evidence targeting view >= 3 survives.
    let kept: Vec<Option<u8>> = context
        .last_change_view_payloads
        .iter()
        .map(|slot| {
            slot.as_ref().map(|payload| match &payload.message.payload {
                MessagePayload::ChangeView(cv) => cv.new_view_number,
                _ => unreachable!(),
            })
        })
        .collect();
    assert_eq!(kept, vec![Some(3), None, Some(4), None]);

    // And the bump cleared the per-view state.
    assert_eq!(context.view_number, 3);
    assert!(context.preparation_payloads.iter().all(Option::is_none));
    assert!(context.transaction_hashes.is_none());
    assert!(context.block.merkle_root.is_none());
    assert_eq!(context.block.timestamp, 0);
}

#[test]
fn view_bump_keeps_commits_and_snapshot() {
    let (mut context, env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    context.transaction_hashes = Some(vec![]);
    context.transactions = Some(Default::default());
    context.make_commit().unwrap();

    context.reset(1).unwrap();
    assert_eq!(context.count_committed(), 1, "commits survive view bumps");
    assert!(context.snapshot().is_some(), "snapshot spans the height");
    assert_eq!(context.my_index, Some(0), "slot is not rediscovered");
    drop(env);
}

#[test]
fn prepare_request_timestamp_is_strictly_monotonic() {
    // Parent header timestamp is 1000 (see common::make_context).
    let (mut context, env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    assert!(context.is_primary());

    env.clock.set(500);
    context.make_prepare_request().unwrap();
    assert_eq!(context.block.timestamp, 1_001, "lagging clock is pulled forward");

    context.reset(1).unwrap();
    context.reset(0).unwrap();
    env.clock.set(2_000);
    context.make_prepare_request().unwrap();
    assert_eq!(context.block.timestamp, 2_000, "healthy clock is used as-is");
}

#[test]
fn prepare_request_fills_proposal_state() {
    let (mut context, _env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();

    let payload = context.make_prepare_request().unwrap();
    assert!(payload.is_signed());
    assert!(context.request_sent_or_received());
    assert!(context.response_sent(), "the request occupies the primary's own slot");

    let hashes = context.transaction_hashes.as_ref().unwrap();
    assert_eq!(hashes.len(), 3);
    let transactions = context.transactions.as_ref().unwrap();
    assert_eq!(transactions.len(), hashes.len());
    for hash in hashes {
        assert!(transactions.contains_key(hash));
    }
    assert_ne!(context.block.consensus_data.nonce, 0);

    match &payload.message.payload {
        MessagePayload::PrepareRequest(request) => {
            assert_eq!(&request.transaction_hashes, hashes);
            assert_eq!(request.timestamp, context.block.timestamp);
            assert_eq!(request.nonce, context.block.consensus_data.nonce);
        }
        other => panic!("expected PrepareRequest, got {other:?}"),
    }
}

#[test]
fn prepare_request_refused_for_backups() {
    let (mut context, _env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();
    assert!(context.is_backup());
    // Release builds fail soft; debug builds would assert.
    if !cfg!(debug_assertions) {
        assert!(matches!(
            context.make_prepare_request(),
            Err(Error::InvalidState(_))
        ));
    }
}

#[test]
fn policies_filter_the_proposal_in_order() {
    let (_, env) = make_context(4, 99, Some(0));
    env.ledger.update(|state| {
        state.mempool = vec![
            sample_transaction(1),
            sample_transaction(2),
            sample_transaction(3),
            sample_transaction(4),
        ];
    });

    let mut context = Context::new(
        env.ledger.clone(),
        Some(env.wallet.clone() as Arc<dyn Wallet>),
        env.store.clone(),
        env.clock.clone(),
        vec![Arc::new(EvenNoncePolicy) as Arc<dyn PolicyPlugin>],
    );
    context.reset(0).unwrap();
    context.make_prepare_request().unwrap();

    let hashes = context.transaction_hashes.as_ref().unwrap();
    assert_eq!(hashes.len(), 2);
    let transactions = context.transactions.as_ref().unwrap();
    assert!(transactions.values().all(|tx| tx.nonce % 2 == 0));
}

#[test]
fn prepare_response_endorses_the_request_by_hash() {
    let (mut context, env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();
    assert!(context.is_backup());

    // No request yet: nothing to respond to.
    assert!(matches!(
        context.make_prepare_response(),
        Err(Error::InvalidState(_))
    ));

    let request = prepare_request_payload(&context, &env.keys[0], 0, 0, vec![]);
    let request_hash = request.hash();
    context.preparation_payloads[0] = Some(request);

    let response = context.make_prepare_response().unwrap();
    assert!(context.response_sent());
    match &response.message.payload {
        MessagePayload::PrepareResponse(body) => {
            assert_eq!(body.preparation_hash, request_hash);
        }
        other => panic!("expected PrepareResponse, got {other:?}"),
    }
}

#[test]
fn commit_is_idempotent() {
    let (mut context, _env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    context.make_prepare_request().unwrap();

    let first = context.make_commit().unwrap();
    let second = context.make_commit().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_array(), second.to_array());
    assert!(context.commit_sent());
    assert_eq!(context.count_committed(), 1);

    // The stored signature verifies over the materialized header.
    match &first.message.payload {
        MessagePayload::Commit(commit) => {
            let header = context.block.header();
            assert!(header.verify_signature(&context.validators[0], &commit.signature));
        }
        other => panic!("expected Commit, got {other:?}"),
    }
}

#[test]
fn ensure_header_is_idempotent_and_merkle_correct() {
    let (mut context, _env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();

    assert!(context.ensure_header().is_none(), "no transaction set yet");

    context.make_prepare_request().unwrap();
    let root_first = {
        context.ensure_header().unwrap();
        context.block.merkle_root.unwrap()
    };
    context.ensure_header().unwrap();
    assert_eq!(context.block.merkle_root.unwrap(), root_first);

    // Root covers the consensus-data hash followed by the tx hashes.
    let mut leaves = vec![context.block.consensus_data.hash()];
    leaves.extend(context.transaction_hashes.as_ref().unwrap().iter().copied());
    assert_eq!(
        dbft_core::MerkleTree::compute_root(&leaves),
        root_first
    );
}

#[test]
fn create_block_assembles_quorum_witness() {
    // N=4 -> F=1, M=3; commits from slots {0, 2, 3}.
    let (mut context, env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    context.make_prepare_request().unwrap();
    context.make_commit().unwrap();

    // Not enough commits yet.
    assert!(matches!(
        context.create_block(),
        Err(Error::QuorumNotReached { have: 1, need: 3 })
    ));

    for slot in [2usize, 3] {
        context.commit_payloads[slot] =
            Some(commit_payload(&context, &env.keys[slot], slot as u16, 0));
    }

    let block = context.create_block().unwrap();
    assert!(context.block_sent());

    // Transactions resolve through the mapping in hash order.
    let hashes = context.transaction_hashes.as_ref().unwrap();
    let transactions = block.transactions.as_ref().unwrap();
    assert_eq!(transactions.len(), hashes.len());
    for (transaction, hash) in transactions.iter().zip(hashes) {
        assert_eq!(&transaction.hash(), hash);
    }

    // The witness is the committee's M-of-N contract, carrying exactly M
    // signatures, each valid for the signing validator in slot order.
    let witness = block.witness.as_ref().unwrap();
    assert_eq!(
        witness.script_hash(),
        consensus_address(&context.validators).unwrap()
    );
    let header = block.header();
    let signatures: Vec<&[u8]> = witness
        .invocation_script
        .chunks(66)
        .map(|chunk| &chunk[2..])
        .collect();
    assert_eq!(signatures.len(), 3);
    for (signature, slot) in signatures.iter().zip([0usize, 2, 3]) {
        assert!(
            header.verify_signature(&context.validators[slot], signature),
            "signature for slot {slot}"
        );
    }
}

#[test]
fn create_block_ignores_stale_view_commits() {
    let (mut context, env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    context.make_prepare_request().unwrap();
    context.make_commit().unwrap();

    // Two more commits, but stamped with view 1.
    for slot in [2usize, 3] {
        context.commit_payloads[slot] =
            Some(commit_payload(&context, &env.keys[slot], slot as u16, 1));
    }
    assert_eq!(context.count_committed(), 3);
    assert!(matches!(
        context.create_block(),
        Err(Error::QuorumNotReached { have: 1, need: 3 })
    ));
}

#[test]
fn view_changing_tracks_own_change_view() {
    let (mut context, _env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();
    assert!(!context.view_changing());

    context.make_change_view(ChangeViewReason::Timeout).unwrap();
    assert!(context.view_changing(), "own request targets view 1 > 0");

    context.reset(1).unwrap();
    assert!(
        !context.view_changing(),
        "after the bump the stored request no longer targets a later view"
    );
}

#[test]
fn refusal_to_accept_payloads_ends_when_quorum_is_compromised() {
    let (mut context, env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();
    let f = context.byzantine_threshold();
    assert_eq!(f, 1);

    // Mark every validator as live at this height.
    for seen in context.last_seen_message.iter_mut() {
        *seen = context.block.index as i64;
    }
    assert_eq!(context.count_failed(), 0);

    context.make_change_view(ChangeViewReason::Timeout).unwrap();
    assert!(context.not_accepting_payloads_due_to_view_changing());

    // Two committed peers (> F) flip the safety rule: keep accepting.
    for slot in [0usize, 2] {
        context.commit_payloads[slot] =
            Some(commit_payload(&context, &env.keys[slot], slot as u16, 0));
    }
    assert!(context.more_than_f_nodes_committed_or_lost());
    assert!(!context.not_accepting_payloads_due_to_view_changing());
}

#[test]
fn count_failed_uses_last_seen_heights() {
    let (mut context, _env) = make_context(7, 99, Some(0));
    context.reset(0).unwrap();

    // Fresh slots start at -1 and count as failed until heard from.
    assert_eq!(context.count_failed(), 6);

    for seen in context.last_seen_message.iter_mut() {
        *seen = 99;
    }
    assert_eq!(context.count_failed(), 0, "height-1 messages are current enough");

    context.last_seen_message[3] = 42;
    context.last_seen_message[5] = -1;
    assert_eq!(context.count_failed(), 2);

    // Definitional property of the split-detection predicate.
    let over = context.count_committed() + context.count_failed() > byzantine_threshold(7);
    assert_eq!(context.more_than_f_nodes_committed_or_lost(), over);
}

#[test]
fn quorum_thresholds_match_the_protocol() {
    for (n, f, m) in [(1usize, 0usize, 1usize), (4, 1, 3), (7, 2, 5), (10, 3, 7)] {
        assert_eq!(byzantine_threshold(n), f);
        assert_eq!(quorum_threshold(n), m);
        let (mut context, _env) = make_context(n, 99, Some(0));
        context.reset(0).unwrap();
        assert_eq!(context.byzantine_threshold(), f);
        assert_eq!(context.required_signatures(), m);
    }
}

#[test]
fn signing_failure_returns_unsigned_payload() {
    let (mut context, env) = make_context(4, 99, Some(1));
    context.reset(0).unwrap();

    env.wallet.set_fail_signing(true);
    let payload = context.make_change_view(ChangeViewReason::Timeout).unwrap();
    assert!(!payload.is_signed(), "operational failure yields an unsigned payload");
    assert!(
        context.change_view_payloads[1].is_some(),
        "the unsigned payload is still stored"
    );

    env.wallet.set_fail_signing(false);
    let payload = context.make_change_view(ChangeViewReason::Timeout).unwrap();
    assert!(payload.is_signed());
}

#[test]
fn payload_arrays_always_match_validator_count() {
    for n in [1usize, 4, 7, 10] {
        let (mut context, env) = make_context(n, 99, Some(0));
        context.reset(0).unwrap();
        for view in 1..=3u8 {
            context.reset(view).unwrap();
            assert_eq!(context.preparation_payloads.len(), n);
            assert_eq!(context.commit_payloads.len(), n);
            assert_eq!(context.change_view_payloads.len(), n);
            assert_eq!(context.last_change_view_payloads.len(), n);
            assert_eq!(context.validators.len(), n);
        }
        drop(env);
    }
}

#[test]
fn dispose_releases_the_snapshot() {
    let (mut context, _env) = make_context(4, 99, Some(0));
    context.reset(0).unwrap();
    assert!(context.snapshot().is_some());
    context.dispose();
    assert!(context.snapshot().is_none());
    assert!(matches!(context.prev_header(), Err(Error::InvalidState(_))));
}
