//! Balance-diff simulation against a scripted chain

use super::test_helpers::native_transfer;
use crate::cache::PersistentCache;
use crate::rpc::{
    AssetContent, ContentMetadata, DasAsset, RpcError, SimulatedTransaction, TokenInfo,
};
use crate::simulator::{AssetKind, BalanceDiffSimulator, SimulationError, TokenProgram};
use crate::test_utils::{native_account, token_account, MockChain};
use crate::tx_builder::compile_unsigned;
use solana_sdk::{
    hash::Hash, instruction::Instruction, pubkey::Pubkey, transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::Duration;

fn simulator(chain: &Arc<MockChain>) -> BalanceDiffSimulator {
    BalanceDiffSimulator::new(
        chain.clone(),
        Arc::new(PersistentCache::in_memory()),
        Duration::from_secs(3600),
    )
}

fn unsigned(ixs: &[Instruction], payer: &Pubkey) -> VersionedTransaction {
    compile_unsigned(ixs, payer, &[], Hash::new_unique()).unwrap()
}

fn usdc() -> DasAsset {
    DasAsset {
        interface: "FungibleToken".to_string(),
        content: Some(AssetContent {
            metadata: ContentMetadata {
                name: Some("USD Coin".to_string()),
                symbol: Some("USDC".to_string()),
            },
            ..Default::default()
        }),
        token_info: Some(TokenInfo {
            decimals: 6,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Owner sends 200 base units from their token account to a stranger's
fn token_scenario(chain: &MockChain) -> (Pubkey, Pubkey, VersionedTransaction) {
    let owner = Pubkey::new_unique();
    let stranger = Pubkey::new_unique();
    let mint = Pubkey::new_unique();
    let source = Pubkey::new_unique();
    let destination = Pubkey::new_unique();

    chain.set_account(source, token_account(spl_token::id(), mint, owner, 500));
    chain.set_post_account(source, token_account(spl_token::id(), mint, owner, 300));
    chain.set_account(destination, token_account(spl_token::id(), mint, stranger, 0));
    chain.set_post_account(destination, token_account(spl_token::id(), mint, stranger, 200));

    let ix = spl_token::instruction::transfer(
        &spl_token::id(),
        &source,
        &destination,
        &owner,
        &[],
        200,
    )
    .unwrap();
    (owner, mint, unsigned(&[ix], &owner))
}

#[tokio::test]
async fn test_native_transfer_seen_from_both_sides() {
    let chain = Arc::new(MockChain::new());
    let a = Pubkey::new_unique();
    let b = Pubkey::new_unique();
    chain.set_account(a, native_account(5_000_000_000));
    chain.set_post_account(a, native_account(4_000_000_000));
    chain.set_account(b, native_account(1_000_000_000));
    chain.set_post_account(b, native_account(2_000_000_000));

    let tx = unsigned(&[native_transfer(&a, &b, 1_000_000_000)], &a);
    let sim = simulator(&chain);

    let sender = sim.simulate(&tx).await.unwrap();
    assert_eq!(sender.len(), 1);
    assert_eq!(sender[0].kind, AssetKind::Native);
    assert_eq!(sender[0].delta, -1_000_000_000);
    assert_eq!(sender[0].ui_amount(), Some(-1.0));

    let receiver = sim.simulate_for(&tx, &b).await.unwrap();
    assert_eq!(receiver.len(), 1);
    assert_eq!(receiver[0].account, b);
    assert_eq!(receiver[0].delta, 1_000_000_000);
}

#[tokio::test]
async fn test_token_change_excludes_stranger_and_gets_metadata() {
    let chain = Arc::new(MockChain::new());
    let (owner, mint, tx) = token_scenario(&chain);
    chain.set_asset(mint, usdc());
    let sim = simulator(&chain);

    let changes = sim.simulate_for(&tx, &owner).await.unwrap();
    assert_eq!(changes.len(), 1, "got {changes:?}");
    assert_eq!(
        changes[0].kind,
        AssetKind::Token {
            program: TokenProgram::Legacy,
            mint
        }
    );
    assert_eq!(changes[0].delta, -200);
    let meta = changes[0].metadata.as_ref().unwrap();
    assert_eq!(meta.symbol.as_deref(), Some("USDC"));
    assert_eq!(changes[0].ui_amount(), Some(-0.0002));

    // Second preview hits the metadata cache
    sim.simulate_for(&tx, &owner).await.unwrap();
    assert_eq!(chain.asset_batch_count(), 1);
}

#[tokio::test]
async fn test_metadata_failure_keeps_raw_changes() {
    let chain = Arc::new(MockChain::new());
    let (owner, _mint, tx) = token_scenario(&chain);
    chain.fail_asset_batch(Some(RpcError::Transport {
        endpoint: "mock".to_string(),
        message: "indexer down".to_string(),
    }));

    let changes = simulator(&chain).simulate_for(&tx, &owner).await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].delta, -200);
    assert!(changes[0].metadata.is_none());
    assert!(changes[0].ui_amount().is_none());
}

#[tokio::test]
async fn test_rejected_dry_run_fails_whole_preview() {
    let chain = Arc::new(MockChain::new());
    let a = Pubkey::new_unique();
    chain.set_account(a, native_account(10));
    chain.set_simulation(SimulatedTransaction {
        err: Some("InsufficientFundsForFee".to_string()),
        logs: vec!["Program log: insufficient".to_string()],
        ..Default::default()
    });

    let tx = unsigned(&[native_transfer(&a, &Pubkey::new_unique(), 1_000)], &a);
    let err = simulator(&chain).simulate(&tx).await.unwrap_err();

    match err {
        SimulationError::Rejected { err, logs } => {
            assert_eq!(err, "InsufficientFundsForFee");
            assert_eq!(logs.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(chain.asset_batch_count(), 0);
}
