//! Test Utilities Module
//!
//! Deterministic stand-ins for the chain RPC, the remote signing backend and
//! the wall clock, so the wallet flows can be exercised without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::backend::{BackendError, SigningBackend};
use crate::cache::Clock;
use crate::compat;
use crate::rpc::{
    AssetsByOwner, ChainRpc, DasAsset, RpcError, SignatureState, SimulatedTransaction,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_program,
    transaction::VersionedTransaction,
};
use spl_token::solana_program::{program_option::COption, program_pack::Pack};
use spl_token::state::{Account as TokenAccount, AccountState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct ChainState {
    priority_fee: Result<u64, RpcError>,
    simulation: SimulatedTransaction,
    accounts: HashMap<Pubkey, Account>,
    post_accounts: HashMap<Pubkey, Account>,
    failing_sends: u32,
    sent: Vec<VersionedTransaction>,
    status: Option<SignatureState>,
    status_error: Option<RpcError>,
    assets: HashMap<Pubkey, DasAsset>,
    asset_error: Option<RpcError>,
    owner_assets: AssetsByOwner,
}

/// Deterministic [`ChainRpc`]
///
/// - simulations return the configured result, with post-state for the
///   requested accounts taken from `set_post_account` (falling back to the
///   current state)
/// - sends return the transaction's own first signature, after the
///   configured number of failures
/// - statuses never reach `confirmed` unless configured
pub struct MockChain {
    blockhash: Hash,
    state: Mutex<ChainState>,
    blockhash_calls: AtomicU32,
    simulate_calls: AtomicU32,
    send_calls: AtomicU32,
    status_calls: AtomicU32,
    asset_batch_calls: AtomicU32,
    owner_calls: AtomicU32,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            state: Mutex::new(ChainState {
                priority_fee: Ok(10_000),
                simulation: SimulatedTransaction {
                    units_consumed: Some(100_000),
                    ..Default::default()
                },
                accounts: HashMap::new(),
                post_accounts: HashMap::new(),
                failing_sends: 0,
                sent: Vec::new(),
                status: None,
                status_error: None,
                assets: HashMap::new(),
                asset_error: None,
                owner_assets: AssetsByOwner::default(),
            }),
            blockhash_calls: AtomicU32::new(0),
            simulate_calls: AtomicU32::new(0),
            send_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            asset_batch_calls: AtomicU32::new(0),
            owner_calls: AtomicU32::new(0),
        }
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn set_priority_fee(&self, fee: Result<u64, RpcError>) {
        self.state.lock().priority_fee = fee;
    }

    /// Result of every dry run; `accounts` is ignored in favour of the
    /// configured post-state
    pub fn set_simulation(&self, simulation: SimulatedTransaction) {
        self.state.lock().simulation = simulation;
    }

    pub fn set_account(&self, key: Pubkey, account: Account) {
        self.state.lock().accounts.insert(key, account);
    }

    pub fn set_post_account(&self, key: Pubkey, account: Account) {
        self.state.lock().post_accounts.insert(key, account);
    }

    /// Fail the next `count` sends
    pub fn fail_sends(&self, count: u32) {
        self.state.lock().failing_sends = count;
    }

    pub fn set_status(&self, status: Option<SignatureState>) {
        self.state.lock().status = status;
    }

    pub fn set_status_error(&self, error: Option<RpcError>) {
        self.state.lock().status_error = error;
    }

    pub fn set_asset(&self, mint: Pubkey, asset: DasAsset) {
        self.state.lock().assets.insert(mint, asset);
    }

    pub fn fail_asset_batch(&self, error: Option<RpcError>) {
        self.state.lock().asset_error = error;
    }

    pub fn set_owner_assets(&self, assets: AssetsByOwner) {
        self.state.lock().owner_assets = assets;
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }

    pub fn blockhash_count(&self) -> u32 {
        self.blockhash_calls.load(Ordering::SeqCst)
    }

    pub fn simulate_count(&self) -> u32 {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn asset_batch_count(&self) -> u32 {
        self.asset_batch_calls.load(Ordering::SeqCst)
    }

    pub fn owner_count(&self) -> u32 {
        self.owner_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_transport(message: &str) -> RpcError {
    RpcError::Transport {
        endpoint: "mock".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.blockhash)
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
        accounts: Option<&[Pubkey]>,
    ) -> Result<SimulatedTransaction, RpcError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let mut result = state.simulation.clone();
        result.accounts = accounts
            .unwrap_or_default()
            .iter()
            .map(|key| {
                state
                    .post_accounts
                    .get(key)
                    .or_else(|| state.accounts.get(key))
                    .cloned()
            })
            .collect();
        Ok(result)
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, RpcError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(mock_transport("node unavailable"));
        }

        let tx: VersionedTransaction =
            bincode::deserialize(wire).map_err(|e| RpcError::malformed("sendTransaction", e.to_string()))?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| mock_transport("unsigned transaction"))?;
        state.sent.push(tx);
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        match &state.status_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.status.clone()),
        }
    }

    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>, RpcError> {
        let state = self.state.lock();
        Ok(keys.iter().map(|k| state.accounts.get(k).cloned()).collect())
    }

    async fn get_priority_fee_estimate(&self, _tx: &VersionedTransaction) -> Result<u64, RpcError> {
        self.state.lock().priority_fee.clone()
    }

    async fn get_asset_batch(&self, ids: &[Pubkey]) -> Result<Vec<Option<DasAsset>>, RpcError> {
        self.asset_batch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if let Some(e) = &state.asset_error {
            return Err(e.clone());
        }
        Ok(ids.iter().map(|id| state.assets.get(id).cloned()).collect())
    }

    async fn get_assets_by_owner(&self, _owner: &Pubkey) -> Result<AssetsByOwner, RpcError> {
        self.owner_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().owner_assets.clone())
    }
}

struct BackendState {
    registered: bool,
    create_returns_key: bool,
    lookup_error: Option<BackendError>,
    sign_error: Option<BackendError>,
    disconnect_fails: bool,
    tamper: bool,
}

/// [`SigningBackend`] that signs with a local keypair
pub struct MockBackend {
    keypair: Keypair,
    state: Mutex<BackendState>,
    lookup_gate: Mutex<Option<Arc<Notify>>>,
    lookup_calls: AtomicU32,
    create_calls: AtomicU32,
    sign_calls: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            state: Mutex::new(BackendState {
                registered: true,
                create_returns_key: true,
                lookup_error: None,
                sign_error: None,
                disconnect_fails: false,
                tamper: false,
            }),
            lookup_gate: Mutex::new(None),
            lookup_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            sign_calls: AtomicU32::new(0),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Whether the user already has a key on record
    pub fn set_registered(&self, registered: bool) {
        self.state.lock().registered = registered;
    }

    pub fn set_create_returns_key(&self, returns_key: bool) {
        self.state.lock().create_returns_key = returns_key;
    }

    pub fn fail_lookups(&self, error: BackendError) {
        self.state.lock().lookup_error = Some(error);
    }

    pub fn fail_signing(&self, error: BackendError) {
        self.state.lock().sign_error = Some(error);
    }

    pub fn fail_disconnect(&self, fails: bool) {
        self.state.lock().disconnect_fails = fails;
    }

    /// Alter the message before signing it
    pub fn tamper_messages(&self, tamper: bool) {
        self.state.lock().tamper = tamper;
    }

    /// Park every key lookup until the returned gate is notified, one
    /// permit per lookup
    pub fn hold_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.lookup_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn lookup_calls(&self) -> u32 {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> u32 {
        self.sign_calls.load(Ordering::SeqCst)
    }

    fn sign_one(&self, mut tx: VersionedTransaction, tamper: bool) -> Result<VersionedTransaction, BackendError> {
        if tamper {
            tx.message.set_recent_blockhash(Hash::new_unique());
        }
        let signers = compat::get_required_signers(&tx.message);
        let required = signers.len();
        let index = signers
            .iter()
            .position(|k| *k == self.keypair.pubkey())
            .ok_or_else(|| BackendError::Status {
                path: "/signTransaction".to_string(),
                status: 400,
                body: "signer not required by transaction".to_string(),
            })?;

        if tx.signatures.len() < required {
            tx.signatures.resize(required, Signature::default());
        }
        tx.signatures[index] = self.keypair.sign_message(&tx.message.serialize());
        Ok(tx)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SigningBackend for MockBackend {
    async fn get_public_key(&self, _token: &str) -> Result<Option<Pubkey>, BackendError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.lookup_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let state = self.state.lock();
        if let Some(e) = &state.lookup_error {
            return Err(e.clone());
        }
        Ok(state.registered.then(|| self.keypair.pubkey()))
    }

    async fn create_public_key(&self, _token: &str) -> Result<Option<Pubkey>, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(state.create_returns_key.then(|| self.keypair.pubkey()))
    }

    async fn sign_transactions(
        &self,
        _token: &str,
        txs: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, BackendError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let tamper = {
            let state = self.state.lock();
            if let Some(e) = &state.sign_error {
                return Err(e.clone());
            }
            state.tamper
        };
        txs.iter().cloned().map(|tx| self.sign_one(tx, tamper)).collect()
    }

    async fn sign_message(&self, _token: &str, message: &[u8]) -> Result<Vec<u8>, BackendError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.state.lock().sign_error {
            return Err(e.clone());
        }
        Ok(self.keypair.sign_message(message).as_ref().to_vec())
    }

    async fn disconnect(&self, _token: &str) -> Result<(), BackendError> {
        if self.state.lock().disconnect_fails {
            return Err(BackendError::Transport {
                path: "/disconnect".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

/// Packed SPL token-account record
pub fn token_account_data(mint: Pubkey, owner: Pubkey, amount: u64) -> Vec<u8> {
    let record = TokenAccount {
        mint,
        owner,
        amount,
        delegate: COption::None,
        state: AccountState::Initialized,
        is_native: COption::None,
        delegated_amount: 0,
        close_authority: COption::None,
    };
    let mut data = vec![0u8; TokenAccount::LEN];
    // A freshly sized buffer always fits the record
    let _ = TokenAccount::pack(record, &mut data);
    data
}

/// Token account owned by `program_id` holding `amount` of `mint` for `owner`
pub fn token_account(program_id: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) -> Account {
    Account {
        lamports: 2_039_280,
        data: token_account_data(mint, owner, amount),
        owner: program_id,
        executable: false,
        rent_epoch: 0,
    }
}

/// System-owned account with no data
pub fn native_account(lamports: u64) -> Account {
    Account {
        lamports,
        data: vec![],
        owner: system_program::id(),
        executable: false,
        rent_epoch: 0,
    }
}

/// Settable clock in milliseconds
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn advance_ms(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
