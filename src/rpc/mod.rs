//! Chain RPC contract
//!
//! Everything the wallet core asks of the chain goes through [`ChainRpc`]:
//! blockhash, dry-run simulation, raw submission, signature status, account
//! reads, plus the provider extensions for priority fees and asset indexing.
//! [`SolanaRpc`] is the network implementation; tests plug in a deterministic
//! mock.

mod client;
pub mod das;
mod errors;

pub use client::SolanaRpc;
pub use das::{
    AssetContent, AssetsByOwner, ContentLinks, ContentMetadata, DasAsset, NativeBalance, PriceInfo,
    TokenInfo,
};
pub use errors::RpcError;

use async_trait::async_trait;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

/// Outcome of a dry-run simulation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedTransaction {
    /// Transaction-level error reported by the runtime, if any
    pub err: Option<String>,
    pub units_consumed: Option<u64>,
    /// Post-state for each requested address, in request order
    pub accounts: Vec<Option<Account>>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

/// Status of a submitted signature as seen by the cluster
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureState {
    pub level: Option<ConfirmationLevel>,
    pub err: Option<String>,
}

impl SignatureState {
    /// Confirmed or finalized
    pub fn is_confirmed(&self) -> bool {
        matches!(self.level, Some(l) if l >= ConfirmationLevel::Confirmed)
    }
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Simulate without signature verification, replacing the blockhash.
    /// When `accounts` is given, their post-state is returned in order.
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        accounts: Option<&[Pubkey]>,
    ) -> Result<SimulatedTransaction, RpcError>;

    /// Submit wire bytes with preflight skipped
    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, RpcError>;

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError>;

    async fn get_multiple_accounts(&self, keys: &[Pubkey])
        -> Result<Vec<Option<Account>>, RpcError>;

    /// Recommended priority fee in micro-lamports per compute unit
    async fn get_priority_fee_estimate(&self, tx: &VersionedTransaction) -> Result<u64, RpcError>;

    /// Indexer metadata for each id, in request order
    async fn get_asset_batch(&self, ids: &[Pubkey]) -> Result<Vec<Option<DasAsset>>, RpcError>;

    async fn get_assets_by_owner(&self, owner: &Pubkey) -> Result<AssetsByOwner, RpcError>;
}
