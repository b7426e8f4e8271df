//! End-to-end send flow: build -> approve -> sign -> broadcast -> confirm

use super::test_helpers::{compute_budget_tags, native_transfer, respond, TestWallet};
use crate::adapter::{WalletError, WalletEvent};
use crate::approval::{ApprovalPayload, ApprovalView, SimulationPreview};
use crate::broadcast::BroadcastError;
use crate::pipeline::PipelineError;
use crate::rpc::{ConfirmationLevel, SignatureState, SimulatedTransaction};
use crate::test_utils::native_account;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tokio::time::Instant;

fn confirmed() -> Option<SignatureState> {
    Some(SignatureState {
        level: Some(ConfirmationLevel::Confirmed),
        err: None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_approve_sign_send_confirm() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    env.chain.set_status(confirmed());

    let owner = env.owner();
    let approver = respond(env.gate(), true);
    let signature = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1_000)], &[], None)
        .await
        .unwrap();
    approver.await.unwrap();

    let sent = env.chain.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(signature, sent[0].signatures[0]);
    assert!(sent[0].verify_with_results().iter().all(|ok| *ok));
    assert_eq!(*sent[0].message.recent_blockhash(), env.chain.blockhash());
    assert_eq!(compute_budget_tags(&sent[0]), vec![2, 3]);
    assert!(matches!(
        *env.gate().subscribe().borrow(),
        ApprovalView::Completed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reject_short_circuits_before_broadcast() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    let owner = env.owner();

    let approver = respond(env.gate(), false);
    let err = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap_err();
    approver.await.unwrap();

    assert!(err.is_user_rejection(), "got {err:?}");
    assert_eq!(env.chain.send_count(), 0);
    assert_eq!(env.backend.sign_calls(), 0);
    assert!(matches!(
        *env.gate().subscribe().borrow(),
        ApprovalView::Failed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_behaves_like_reject() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    let owner = env.owner();

    let started = Instant::now();
    let err = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap_err();

    assert!(err.is_user_rejection(), "got {err:?}");
    assert_eq!(started.elapsed(), Duration::from_secs(60));
    assert_eq!(env.chain.send_count(), 0);
    assert_eq!(env.backend.sign_calls(), 0);
    assert!(env.gate().current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_unit_simulation_still_prices() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    env.chain.set_status(confirmed());
    env.chain.set_simulation(SimulatedTransaction {
        err: Some("InstructionError(0, Custom(1))".to_string()),
        ..Default::default()
    });

    let owner = env.owner();
    let approver = respond(env.gate(), true);
    env.pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap();
    approver.await.unwrap();

    let sent = env.chain.sent_transactions();
    assert_eq!(compute_budget_tags(&sent[0]), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_is_distinct_from_send_failure() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    let owner = env.owner();

    let approver = respond(env.gate(), true);
    let err = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap_err();
    approver.await.unwrap();

    match err {
        PipelineError::Broadcast(BroadcastError::ConfirmationTimeout { signature, waited }) => {
            assert_eq!(signature, env.chain.sent_transactions()[0].signatures[0]);
            assert_eq!(waited, Duration::from_secs(15));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(env.chain.send_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_failure_is_published_as_wallet_error() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    let owner = env.owner();
    let mut events = env.wallet.subscribe();

    let approver = respond(env.gate(), true);
    let err = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap_err();
    approver.await.unwrap();

    let expected = match err {
        PipelineError::Broadcast(e) => e,
        other => panic!("unexpected {other:?}"),
    };
    assert!(matches!(expected, BroadcastError::ConfirmationTimeout { .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        WalletEvent::Error(WalletError::Broadcast(expected))
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_not_connected_builds_nothing() {
    let env = TestWallet::new();
    let owner = env.owner();

    let err = env
        .pipeline
        .build_and_send(vec![native_transfer(&owner, &Pubkey::new_unique(), 1)], &[], None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NotConnected));
    assert_eq!(env.chain.blockhash_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sign_and_send_prebuilt_transaction() {
    let env = TestWallet::new();
    env.wallet.connect().await.unwrap();
    env.chain.set_status(confirmed());

    let owner = env.owner();
    let unsigned = crate::tx_builder::compile_unsigned(
        &[native_transfer(&owner, &Pubkey::new_unique(), 5)],
        &owner,
        &[],
        env.chain.blockhash(),
    )
    .unwrap();

    let approver = respond(env.gate(), true);
    let signature = env
        .wallet
        .sign_and_send_transaction(unsigned, None)
        .await
        .unwrap();
    approver.await.unwrap();

    assert_eq!(signature, env.chain.sent_transactions()[0].signatures[0]);
}

#[tokio::test(start_paused = true)]
async fn test_approval_carries_balance_preview() {
    let env = TestWallet::with_preview();
    env.wallet.connect().await.unwrap();
    env.chain.set_status(confirmed());

    let owner = env.owner();
    let recipient = Pubkey::new_unique();
    env.chain.set_account(owner, native_account(3_000_000_000));
    env.chain.set_post_account(owner, native_account(2_000_000_000));
    env.chain.set_account(recipient, native_account(0));
    env.chain.set_post_account(recipient, native_account(1_000_000_000));

    let approver = respond(env.gate(), true);
    env.pipeline
        .build_and_send(vec![native_transfer(&owner, &recipient, 1_000_000_000)], &[], None)
        .await
        .unwrap();
    let shown = approver.await.unwrap();

    let ApprovalView::Pending(pending) = shown else {
        panic!("approval was never displayed");
    };
    assert!(matches!(pending.payload, ApprovalPayload::Transactions(ref txs) if txs.len() == 1));
    match &pending.preview {
        SimulationPreview::Changes(changes) => {
            assert_eq!(changes.len(), 1, "only the requester's own balance");
            assert_eq!(changes[0].account, owner);
            assert_eq!(changes[0].delta, -1_000_000_000);
        }
        other => panic!("unexpected preview {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_dry_run_is_flagged_in_preview() {
    let env = TestWallet::with_preview();
    env.wallet.connect().await.unwrap();
    let owner = env.owner();
    let unsigned = crate::tx_builder::compile_unsigned(
        &[native_transfer(&owner, &Pubkey::new_unique(), 5)],
        &owner,
        &[],
        env.chain.blockhash(),
    )
    .unwrap();
    env.chain.set_simulation(SimulatedTransaction {
        err: Some("InsufficientFundsForRent".to_string()),
        ..Default::default()
    });

    let approver = respond(env.gate(), false);
    let err = env.wallet.sign_transaction(unsigned).await.unwrap_err();
    let shown = approver.await.unwrap();

    assert!(err.is_user_rejection());
    let ApprovalView::Pending(pending) = shown else {
        panic!("approval was never displayed");
    };
    assert!(matches!(pending.preview, SimulationPreview::Failed(ref e) if e == "InsufficientFundsForRent"));
}
