//! Test Helper Utilities
//!
//! Fixtures shared by the cross-module tests:
//! - a fully wired wallet over `MockChain` / `MockBackend`
//! - a scripted approver standing in for the UI
//! - compute-budget inspection of compiled transactions

use crate::adapter::{InAppWallet, StaticHost};
use crate::approval::{ApprovalGate, ApprovalView};
use crate::broadcast::Broadcaster;
use crate::cache::PersistentCache;
use crate::config::{BroadcastConfig, FeesConfig};
use crate::pipeline::WalletPipeline;
use crate::simulator::BalanceDiffSimulator;
use crate::test_utils::{MockBackend, MockChain};
use crate::tx_builder::TransactionBuilder;
use solana_sdk::{
    compute_budget, instruction::Instruction, pubkey::Pubkey, transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) struct TestWallet {
    pub chain: Arc<MockChain>,
    pub backend: Arc<MockBackend>,
    pub cache: Arc<PersistentCache>,
    pub wallet: Arc<InAppWallet>,
    pub pipeline: WalletPipeline,
}

impl TestWallet {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Approval requests carry a balance-diff preview
    pub fn with_preview() -> Self {
        Self::build(true)
    }

    fn build(preview: bool) -> Self {
        let chain = Arc::new(MockChain::new());
        let backend = Arc::new(MockBackend::new());
        let cache = Arc::new(PersistentCache::in_memory());
        let broadcaster = Arc::new(Broadcaster::new(chain.clone(), BroadcastConfig::default()));

        let mut wallet = InAppWallet::new(
            &StaticHost::with_token("launch-token"),
            backend.clone(),
            Arc::new(ApprovalGate::new(Duration::from_secs(60))),
            broadcaster.clone(),
            cache.clone(),
            "test-app",
        );
        if preview {
            wallet = wallet.with_simulator(Arc::new(BalanceDiffSimulator::new(
                chain.clone(),
                cache.clone(),
                Duration::from_secs(3600),
            )));
        }
        let wallet = Arc::new(wallet);

        let pipeline = WalletPipeline::new(
            TransactionBuilder::new(chain.clone(), FeesConfig::default()),
            wallet.clone(),
            broadcaster,
        );

        Self {
            chain,
            backend,
            cache,
            wallet,
            pipeline,
        }
    }

    pub fn owner(&self) -> Pubkey {
        self.backend.pubkey()
    }

    pub fn gate(&self) -> Arc<ApprovalGate> {
        self.wallet.gate().clone()
    }
}

/// Answer the next approval request once it is displayed
pub(crate) fn respond(gate: Arc<ApprovalGate>, approve: bool) -> JoinHandle<ApprovalView> {
    tokio::spawn(async move {
        let mut view = gate.subscribe();
        let shown = view
            .wait_for(|v| matches!(v, ApprovalView::Pending(_)))
            .await
            .map(|v| v.clone())
            .unwrap_or_default();
        if approve {
            gate.approve();
        } else {
            gate.cancel();
        }
        shown
    })
}

pub(crate) fn native_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    #[allow(deprecated)]
    solana_sdk::system_instruction::transfer(from, to, lamports)
}

/// Compute-budget instruction tags in order (2 = unit limit, 3 = unit price)
pub(crate) fn compute_budget_tags(tx: &VersionedTransaction) -> Vec<u8> {
    let keys = tx.message.static_account_keys();
    tx.message
        .instructions()
        .iter()
        .filter(|ix| keys[ix.program_id_index as usize] == compute_budget::id())
        .filter_map(|ix| ix.data.first().copied())
        .collect()
}
