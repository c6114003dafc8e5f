//! Shared test doubles: ledger, wallet, store and clock.

use dbft_consensus::{
    ChangeView, ChangeViewReason, Clock, Commit, ConsensusMessage, ConsensusPayload, Context,
    ContextStore, Ledger, LedgerSnapshot, MessagePayload, PolicyPlugin, Wallet, WalletAccount,
};
use dbft_core::{Contract, Header, KeyPair, PublicKey, Transaction, UInt256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Ledger state the doubles snapshot from.
#[derive(Clone)]
pub struct LedgerState {
    pub height: u32,
    pub current_hash: UInt256,
    pub headers: HashMap<UInt256, Header>,
    pub validators: Vec<PublicKey>,
    pub mempool: Vec<Transaction>,
}

pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    #[allow(dead_code)]
    pub fn update<F: FnOnce(&mut LedgerState)>(&self, mutate: F) {
        mutate(&mut self.state.lock().unwrap());
    }
}

impl Ledger for MemoryLedger {
    fn snapshot(&self) -> Box<dyn LedgerSnapshot> {
        Box::new(MemorySnapshot {
            state: self.state.lock().unwrap().clone(),
        })
    }
}

struct MemorySnapshot {
    state: LedgerState,
}

impl LedgerSnapshot for MemorySnapshot {
    fn current_block_hash(&self) -> UInt256 {
        self.state.current_hash
    }

    fn height(&self) -> u32 {
        self.state.height
    }

    fn get_header(&self, hash: &UInt256) -> Option<Header> {
        self.state.headers.get(hash).cloned()
    }

    fn next_block_validators(&self) -> Vec<PublicKey> {
        self.state.validators.clone()
    }

    fn sorted_verified_transactions(&self) -> Vec<Transaction> {
        self.state.mempool.clone()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<(u8, Vec<u8>), Vec<u8>>>,
}

impl ContextStore for MemoryStore {
    fn get(&self, prefix: u8, key: &[u8]) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(&(prefix, key.to_vec())).cloned()
    }

    fn put_sync(&self, prefix: u8, key: &[u8], value: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert((prefix, key.to_vec()), value.to_vec());
    }
}

impl MemoryStore {
    #[allow(dead_code)]
    pub fn corrupt(&self, prefix: u8, key: &[u8]) {
        let mut data = self.data.lock().unwrap();
        if let Some(value) = data.get_mut(&(prefix, key.to_vec())) {
            value.truncate(value.len() / 2);
        }
    }
}

pub struct TestWallet {
    keys: Vec<KeyPair>,
    fail_signing: AtomicBool,
}

impl TestWallet {
    pub fn new(keys: Vec<KeyPair>) -> Self {
        Self {
            keys,
            fail_signing: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn set_fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }
}

impl Wallet for TestWallet {
    fn account(&self, public_key: &PublicKey) -> Option<WalletAccount> {
        self.keys
            .iter()
            .find(|key| key.public_key() == public_key)
            .map(|key| WalletAccount::with_key(key.clone()))
    }

    fn sign(
        &self,
        data: &[u8],
        key_pair: &KeyPair,
    ) -> dbft_consensus::WalletResult<[u8; 64]> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(dbft_consensus::WalletError::SigningFailed(
                "simulated keystore failure".into(),
            ));
        }
        Ok(key_pair.sign(data))
    }
}

pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    #[allow(dead_code)]
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Drops every transaction whose nonce is odd.
#[allow(dead_code)]
pub struct EvenNoncePolicy;

impl PolicyPlugin for EvenNoncePolicy {
    fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions
            .into_iter()
            .filter(|transaction| transaction.nonce % 2 == 0)
            .collect()
    }
}

/// Everything a context test needs to drive the state machine.
pub struct TestEnv {
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub wallet: Arc<TestWallet>,
    pub keys: Vec<KeyPair>,
}

/// Deterministic validator keys, one per slot.
pub fn validator_keys(count: usize) -> Vec<KeyPair> {
    (0..count)
        .map(|slot| {
            let mut private_key = [0u8; 32];
            private_key[31] = slot as u8 + 1;
            KeyPair::from_private_key(&private_key).expect("test key")
        })
        .collect()
}

pub fn sample_transaction(nonce: u32) -> Transaction {
    Transaction::new(0, nonce, 1_000_000, vec![0x51, nonce as u8])
}

/// Builds a ledger at `height` with `n` validators, a parent header, and a
/// small mempool, plus a context whose wallet holds the key for `my_slot`.
pub fn make_context(n: usize, height: u32, my_slot: Option<usize>) -> (Context, TestEnv) {
    let keys = validator_keys(n);
    let validators: Vec<PublicKey> = keys.iter().map(|key| *key.public_key()).collect();

    let current_hash = UInt256::from([0xBB; 32]);
    let parent_header = Header {
        version: 0,
        prev_hash: UInt256::from([0xAA; 32]),
        merkle_root: UInt256::zero(),
        timestamp: 1_000,
        index: height,
        consensus_data: Default::default(),
        next_consensus: Default::default(),
        witness: Default::default(),
    };
    let mut headers = HashMap::new();
    headers.insert(current_hash, parent_header);

    let ledger = Arc::new(MemoryLedger::new(LedgerState {
        height,
        current_hash,
        headers,
        validators,
        mempool: vec![
            sample_transaction(2),
            sample_transaction(4),
            sample_transaction(6),
        ],
    }));
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(2_000));

    let wallet_keys = my_slot.map(|slot| vec![keys[slot].clone()]).unwrap_or_default();
    let wallet = Arc::new(TestWallet::new(wallet_keys));

    let context = Context::new(
        ledger.clone(),
        Some(wallet.clone() as Arc<dyn Wallet>),
        store.clone(),
        clock.clone(),
        Vec::new(),
    );
    (
        context,
        TestEnv {
            ledger,
            store,
            clock,
            wallet,
            keys,
        },
    )
}

/// A ChangeView payload as peer `slot` would send it.
#[allow(dead_code)]
pub fn change_view_payload(
    context: &Context,
    key: &KeyPair,
    slot: u16,
    view: u8,
    new_view: u8,
) -> ConsensusPayload {
    let message = ConsensusMessage::new(
        view,
        MessagePayload::ChangeView(ChangeView {
            new_view_number: new_view,
            timestamp: 1_500,
            reason: ChangeViewReason::Timeout,
        }),
    );
    signed_peer_payload(context, key, slot, message)
}

/// A Commit payload as peer `slot` would send it for the current header.
#[allow(dead_code)]
pub fn commit_payload(context: &Context, key: &KeyPair, slot: u16, view: u8) -> ConsensusPayload {
    let signature = context.block.header().sign(key);
    let message = ConsensusMessage::new(view, MessagePayload::Commit(Commit { signature }));
    signed_peer_payload(context, key, slot, message)
}

/// A PrepareRequest payload as the primary in `slot` would send it.
#[allow(dead_code)]
pub fn prepare_request_payload(
    context: &Context,
    key: &KeyPair,
    slot: u16,
    view: u8,
    transaction_hashes: Vec<UInt256>,
) -> ConsensusPayload {
    let message = ConsensusMessage::new(
        view,
        MessagePayload::PrepareRequest(dbft_consensus::PrepareRequest {
            timestamp: 1_500,
            nonce: 7,
            transaction_hashes,
        }),
    );
    signed_peer_payload(context, key, slot, message)
}

/// A PrepareResponse payload as peer `slot` would send it.
#[allow(dead_code)]
pub fn prepare_response_payload(
    context: &Context,
    key: &KeyPair,
    slot: u16,
    view: u8,
    preparation_hash: UInt256,
) -> ConsensusPayload {
    let message = ConsensusMessage::new(
        view,
        MessagePayload::PrepareResponse(dbft_consensus::PrepareResponse { preparation_hash }),
    );
    signed_peer_payload(context, key, slot, message)
}

fn signed_peer_payload(
    context: &Context,
    key: &KeyPair,
    slot: u16,
    message: ConsensusMessage,
) -> ConsensusPayload {
    let mut payload = ConsensusPayload::new(
        context.block.version,
        context.block.prev_hash,
        context.block.index,
        slot,
        message,
    );
    let signature = key.sign(&payload.unsigned_data());
    let contract = Contract::create_signature_contract(key.public_key());
    payload.witness = contract.create_witness(&[signature]).expect("witness");
    payload
}
