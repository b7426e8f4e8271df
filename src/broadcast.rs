//! Broadcast & confirmation poller
//!
//! Two sequential, independently reported phases:
//! - `send` resubmits the signed bytes (preflight skipped) until one
//!   submission succeeds or the send budget runs out. Per-attempt errors are
//!   swallowed.
//! - `confirm` polls the signature status on a fixed interval until it
//!   reaches `confirmed` or the deadline passes.
//!
//! Both budgets are hard ceilings. A caller that loses interest cancels the
//! token it passed in, and the poller stops at its next suspension point.

use crate::compat;
use crate::config::BroadcastConfig;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BroadcastError {
    #[error("Failed to serialize transaction: {0}")]
    Encode(String),

    /// No submission succeeded within the send budget.
    ///
    /// `signature` is the transaction's own id when it is known, so callers
    /// can still look it up on chain.
    #[error("Send budget exhausted after {attempts} attempts (signature: {signature:?}, last error: {last_error:?})")]
    SendExhausted {
        signature: Option<Signature>,
        attempts: u32,
        last_error: Option<String>,
    },

    /// The signature did not reach `confirmed` before the deadline
    #[error("Transaction {signature}'s confirmation timed out after {waited:?}")]
    ConfirmationTimeout {
        signature: Signature,
        waited: Duration,
    },

    /// The transaction landed but failed on chain
    #[error("Transaction {signature} failed: {err}")]
    TransactionFailed { signature: Signature, err: String },

    #[error("Broadcast cancelled by caller")]
    Cancelled,
}

impl BroadcastError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::SendExhausted { .. } => "send_exhausted",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// The signature the caller can re-query, if one is known
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Self::SendExhausted { signature, .. } => *signature,
            Self::ConfirmationTimeout { signature, .. }
            | Self::TransactionFailed { signature, .. } => Some(*signature),
            Self::Encode(_) | Self::Cancelled => None,
        }
    }
}

async fn or_cancelled<F: Future>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Result<F::Output, BroadcastError> {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(BroadcastError::Cancelled),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct Broadcaster {
    rpc: Arc<dyn ChainRpc>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: BroadcastConfig) -> Self {
        Self { rpc, config }
    }

    /// Submit a signed transaction
    pub async fn send(
        &self,
        tx: &VersionedTransaction,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, BroadcastError> {
        let wire = bincode::serialize(tx).map_err(|e| BroadcastError::Encode(e.to_string()))?;
        self.send_wire(&wire, compat::get_primary_signature(tx), cancel)
            .await
    }

    /// Submit already-serialized transaction bytes
    #[instrument(skip_all, fields(bytes = wire.len()))]
    pub async fn send_wire(
        &self,
        wire: &[u8],
        own_signature: Option<Signature>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, BroadcastError> {
        let deadline = Instant::now() + self.config.send_timeout();
        let retry_delay = self.config.send_retry_delay();
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            metrics().broadcast_attempts.inc();

            let attempt = timeout(remaining, self.rpc.send_raw_transaction(wire));
            match or_cancelled(cancel, attempt).await? {
                Ok(Ok(signature)) => {
                    debug!(%signature, attempts, "Transaction submitted");
                    return Ok(signature);
                }
                Ok(Err(e)) => {
                    debug!(
                        attempt = attempts,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Send attempt failed, retrying"
                    );
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    last_error = Some("send attempt timed out".to_string());
                }
            }

            if retry_delay.is_zero() {
                or_cancelled(cancel, tokio::task::yield_now()).await?;
            } else {
                let pause = retry_delay.min(deadline.saturating_duration_since(Instant::now()));
                or_cancelled(cancel, tokio::time::sleep(pause)).await?;
            }
        }

        metrics().broadcast_failures.inc();
        warn!(attempts, ?last_error, "Send budget exhausted");
        Err(BroadcastError::SendExhausted {
            signature: own_signature,
            attempts,
            last_error,
        })
    }

    /// Poll until `signature` is confirmed or the deadline passes
    #[instrument(skip_all, fields(signature = %signature))]
    pub async fn confirm(
        &self,
        signature: &Signature,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, BroadcastError> {
        let started = Instant::now();
        let deadline = started + self.config.confirm_timeout();
        // interval_at panics on a zero period
        let poll_interval = self.config.poll_interval().max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval_at(started + poll_interval, poll_interval);

        loop {
            or_cancelled(cancel, ticker.tick()).await?;

            match or_cancelled(cancel, timeout(poll_interval, self.rpc.get_signature_status(signature))).await? {
                Ok(Ok(Some(status))) => {
                    if let Some(err) = status.err {
                        return Err(BroadcastError::TransactionFailed {
                            signature: *signature,
                            err,
                        });
                    }
                    if status.is_confirmed() {
                        metrics()
                            .confirmation_latency
                            .observe(started.elapsed().as_secs_f64());
                        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Transaction confirmed");
                        return Ok(*signature);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => debug!(error = %e, "Status poll failed"),
                Err(_) => debug!("Status poll timed out"),
            }

            if Instant::now() >= deadline {
                metrics().confirmation_timeouts.inc();
                return Err(BroadcastError::ConfirmationTimeout {
                    signature: *signature,
                    waited: started.elapsed(),
                });
            }
        }
    }

    /// `send` then `confirm`
    pub async fn send_and_confirm(
        &self,
        tx: &VersionedTransaction,
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, BroadcastError> {
        let signature = self.send(tx, cancel).await?;
        self.confirm(&signature, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ConfirmationLevel, RpcError, SignatureState};
    use crate::test_utils::MockChain;
    use solana_sdk::{hash::Hash, message::Message, signature::Keypair, signer::Signer, transaction::Transaction};

    fn signed_tx() -> VersionedTransaction {
        let payer = Keypair::new();
        let message = Message::new(&[], Some(&payer.pubkey()));
        VersionedTransaction::from(Transaction::new(&[&payer], message, Hash::new_unique()))
    }

    fn config(send_retry_delay_ms: u64) -> BroadcastConfig {
        BroadcastConfig {
            send_retry_delay_ms,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retries_until_success() {
        let chain = Arc::new(MockChain::new());
        let tx = signed_tx();
        chain.fail_sends(3);

        let broadcaster = Broadcaster::new(chain.clone(), config(500));
        let signature = broadcaster.send(&tx, None).await.unwrap();

        assert_eq!(signature, tx.signatures[0]);
        assert_eq!(chain.send_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_budget_is_a_hard_ceiling() {
        let chain = Arc::new(MockChain::new());
        chain.fail_sends(u32::MAX);
        let tx = signed_tx();

        let broadcaster = Broadcaster::new(chain.clone(), config(1_000));
        let started = Instant::now();
        let err = broadcaster.send(&tx, None).await.unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(60));
        match err {
            BroadcastError::SendExhausted {
                signature,
                attempts,
                last_error,
            } => {
                assert_eq!(signature, Some(tx.signatures[0]));
                assert_eq!(attempts, 60);
                assert!(last_error.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_times_out_at_deadline() {
        let chain = Arc::new(MockChain::new());
        chain.set_status(Some(SignatureState {
            level: Some(ConfirmationLevel::Processed),
            err: None,
        }));

        let broadcaster = Broadcaster::new(chain.clone(), BroadcastConfig::default());
        let started = Instant::now();
        let err = broadcaster
            .confirm(&Signature::new_unique(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, BroadcastError::ConfirmationTimeout { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(chain.status_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_succeeds_on_confirmed() {
        let chain = Arc::new(MockChain::new());
        chain.set_status(Some(SignatureState {
            level: Some(ConfirmationLevel::Confirmed),
            err: None,
        }));

        let broadcaster = Broadcaster::new(chain, BroadcastConfig::default());
        let started = Instant::now();
        let sig = Signature::new_unique();
        assert_eq!(broadcaster.confirm(&sig, None).await.unwrap(), sig);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_reports_onchain_failure() {
        let chain = Arc::new(MockChain::new());
        chain.set_status(Some(SignatureState {
            level: Some(ConfirmationLevel::Confirmed),
            err: Some("InstructionError(0, Custom(6001))".to_string()),
        }));

        let broadcaster = Broadcaster::new(chain, BroadcastConfig::default());
        let err = broadcaster
            .confirm(&Signature::new_unique(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::TransactionFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_are_swallowed() {
        let chain = Arc::new(MockChain::new());
        chain.set_status_error(Some(RpcError::Timeout {
            endpoint: "mock".to_string(),
        }));

        let broadcaster = Broadcaster::new(chain, BroadcastConfig::default());
        let err = broadcaster
            .confirm(&Signature::new_unique(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::ConfirmationTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_clamped() {
        let chain = Arc::new(MockChain::new());
        chain.set_status(Some(SignatureState {
            level: Some(ConfirmationLevel::Confirmed),
            err: None,
        }));
        let unvalidated = BroadcastConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };

        let broadcaster = Broadcaster::new(chain.clone(), unvalidated);
        let started = Instant::now();
        let sig = Signature::new_unique();
        assert_eq!(broadcaster.confirm(&sig, None).await.unwrap(), sig);
        assert_eq!(started.elapsed(), MIN_POLL_INTERVAL);
        assert_eq!(chain.status_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budgets_time_out_after_one_poll() {
        let chain = Arc::new(MockChain::new());
        let unvalidated = BroadcastConfig {
            poll_interval_secs: 0,
            confirm_timeout_secs: 0,
            ..Default::default()
        };

        let broadcaster = Broadcaster::new(chain.clone(), unvalidated);
        let err = broadcaster
            .confirm(&Signature::new_unique(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, BroadcastError::ConfirmationTimeout { .. }));
        assert_eq!(chain.status_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let chain = Arc::new(MockChain::new());
        let broadcaster = Broadcaster::new(chain.clone(), BroadcastConfig::default());
        let token = CancellationToken::new();

        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            child.cancel();
        });

        let started = Instant::now();
        let err = broadcaster
            .confirm(&Signature::new_unique(), Some(&token))
            .await
            .unwrap_err();

        assert_eq!(err, BroadcastError::Cancelled);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(chain.status_count(), 1);
    }
}
