//! Balance-diff simulator
//!
//! Turns a pre-signature transaction into the list of balance changes its
//! requester would see: fetch current state for every state-holding account,
//! dry-run the transaction requesting post-state for the same accounts, diff
//! the two, then attach indexer metadata to token changes.
//!
//! A transaction the chain rejects in the dry run fails the whole operation.
//! Accounts that do not decode are dropped, and a metadata lookup failure
//! leaves token changes without symbols rather than failing.

mod decode;
mod errors;
mod types;

pub use decode::{is_known_program, TOKEN_2022_PROGRAM_ID};
pub use errors::SimulationError;
pub use types::{AssetChange, AssetKind, AssetMetadata, TokenProgram};

use crate::cache::PersistentCache;
use crate::compat;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub fn metadata_cache_key(mint: &Pubkey) -> String {
    format!("asset-meta/{}", mint)
}

pub struct BalanceDiffSimulator {
    rpc: Arc<dyn ChainRpc>,
    cache: Arc<PersistentCache>,
    metadata_ttl: Duration,
}

impl BalanceDiffSimulator {
    pub fn new(rpc: Arc<dyn ChainRpc>, cache: Arc<PersistentCache>, metadata_ttl: Duration) -> Self {
        Self {
            rpc,
            cache,
            metadata_ttl,
        }
    }

    /// Balance changes for the transaction's fee payer
    pub async fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Vec<AssetChange>, SimulationError> {
        let payer = compat::get_fee_payer(&tx.message).ok_or(SimulationError::NoFeePayer)?;
        self.simulate_for(tx, &payer).await
    }

    /// Balance changes as seen by `requester`.
    ///
    /// Native changes come first, then token changes, each in account order.
    #[instrument(skip_all, fields(requester = %requester))]
    pub async fn simulate_for(
        &self,
        tx: &VersionedTransaction,
        requester: &Pubkey,
    ) -> Result<Vec<AssetChange>, SimulationError> {
        let keys: Vec<Pubkey> = compat::get_static_account_keys(&tx.message)
            .iter()
            .filter(|k| !is_known_program(k))
            .copied()
            .collect();

        let (pre, simulated) = tokio::join!(
            self.rpc.get_multiple_accounts(&keys),
            self.rpc.simulate_transaction(tx, Some(&keys))
        );

        let simulated = simulated?;
        if let Some(err) = simulated.err {
            metrics().simulation_failures.inc();
            debug!(%err, "Dry run rejected");
            return Err(SimulationError::Rejected {
                err,
                logs: simulated.logs,
            });
        }
        let pre = pre?;

        if pre.len() != keys.len() {
            return Err(SimulationError::AccountCountMismatch {
                source_name: "getMultipleAccounts",
                expected: keys.len(),
                actual: pre.len(),
            });
        }
        if simulated.accounts.len() != keys.len() {
            return Err(SimulationError::AccountCountMismatch {
                source_name: "simulateTransaction",
                expected: keys.len(),
                actual: simulated.accounts.len(),
            });
        }

        let changes: Vec<AssetChange> = keys
            .iter()
            .zip(pre.iter().zip(simulated.accounts.iter()))
            .filter_map(|(key, (before, after))| {
                decode::diff_account(key, before.as_ref(), after.as_ref(), requester)
            })
            .collect();

        let (mut native, mut tokens): (Vec<_>, Vec<_>) =
            changes.into_iter().partition(AssetChange::is_native);

        for change in &mut native {
            change.metadata = Some(AssetMetadata::native());
        }

        let mints: Vec<Pubkey> = {
            let mut seen = HashSet::new();
            tokens
                .iter()
                .filter_map(|c| c.kind.mint())
                .filter(|m| seen.insert(*m))
                .collect()
        };
        if !mints.is_empty() {
            let metadata = self.resolve_metadata(&mints).await;
            for change in &mut tokens {
                if let Some(mint) = change.kind.mint() {
                    change.metadata = metadata.get(&mint).cloned();
                }
            }
        }

        debug!(
            native = native.len(),
            tokens = tokens.len(),
            inspected = keys.len(),
            "Balance diff computed"
        );

        native.extend(tokens);
        Ok(native)
    }

    /// Cached metadata first, one indexer batch call for the rest
    async fn resolve_metadata(&self, mints: &[Pubkey]) -> HashMap<Pubkey, AssetMetadata> {
        let mut found = HashMap::with_capacity(mints.len());
        let mut missing = Vec::new();

        for mint in mints {
            match self.cache.fetch::<AssetMetadata>(&metadata_cache_key(mint)) {
                Some(meta) => {
                    found.insert(*mint, meta);
                }
                None => missing.push(*mint),
            }
        }

        if missing.is_empty() {
            return found;
        }

        match self.rpc.get_asset_batch(&missing).await {
            Ok(assets) => {
                for (mint, asset) in missing.iter().zip(assets) {
                    if let Some(asset) = asset {
                        let meta = AssetMetadata::from(&asset);
                        self.cache
                            .put(&metadata_cache_key(mint), &meta, self.metadata_ttl);
                        found.insert(*mint, meta);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, mints = missing.len(), "Metadata lookup failed, showing raw amounts");
            }
        }

        found
    }
}
