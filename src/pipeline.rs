//! End-to-end send flow
//!
//! build (estimate, price, blockhash) -> approve & sign -> broadcast -> confirm.
//! A rejection surfaces from the signing step and stops the flow before
//! anything is sent.

use crate::adapter::{InAppWallet, WalletError};
use crate::broadcast::{BroadcastError, Broadcaster};
use crate::observability::{CorrelationId, StageTimer};
use crate::tx_builder::{TransactionBuilder, TransactionBuilderError};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, instruction::Instruction,
    signature::Signature,
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error(transparent)]
    Build(#[from] TransactionBuilderError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

impl PipelineError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Build(e) => e.category(),
            Self::Broadcast(e) => e.category(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Build(e) if e.is_user_rejection())
    }
}

pub struct WalletPipeline {
    builder: TransactionBuilder,
    wallet: Arc<InAppWallet>,
    broadcaster: Arc<Broadcaster>,
}

impl WalletPipeline {
    pub fn new(
        builder: TransactionBuilder,
        wallet: Arc<InAppWallet>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            builder,
            wallet,
            broadcaster,
        }
    }

    /// Build, get approval and a signature, then send and wait for
    /// confirmation. Returns the confirmed signature.
    #[instrument(skip_all, fields(instructions = instructions.len()))]
    pub async fn build_and_send(
        &self,
        instructions: Vec<Instruction>,
        lookup_tables: &[AddressLookupTableAccount],
        cancel: Option<&CancellationToken>,
    ) -> Result<Signature, PipelineError> {
        let payer = self.wallet.public_key().ok_or(PipelineError::NotConnected)?;
        let correlation_id = CorrelationId::new();

        let timer = StageTimer::start(&correlation_id, "build_and_sign");
        let signed = self
            .builder
            .build(instructions, &payer, lookup_tables, |tx| {
                self.wallet.sign_transaction(tx)
            })
            .await
            .inspect_err(|e| {
                // Signing failures are already reported by the wallet
                if !matches!(e, TransactionBuilderError::Signing(_)) {
                    warn!(
                        error = %e,
                        category = e.category(),
                        retryable = e.is_retryable(),
                        "Build failed"
                    );
                }
            })?;
        timer.finish();

        let timer = StageTimer::start(&correlation_id, "send");
        let signature = self
            .broadcaster
            .send(&signed, cancel)
            .await
            .map_err(|e| self.broadcast_failed(e))?;
        timer.finish();

        let timer = StageTimer::start(&correlation_id, "confirm");
        self.broadcaster
            .confirm(&signature, cancel)
            .await
            .map_err(|e| self.broadcast_failed(e))?;
        let waited = timer.elapsed_ms();
        timer.finish();

        info!(%signature, %correlation_id, confirm_ms = waited, "Transaction confirmed");
        Ok(signature)
    }

    /// Publish a send or confirm failure on the wallet's event channel
    fn broadcast_failed(&self, err: BroadcastError) -> PipelineError {
        self.wallet.report(&WalletError::Broadcast(err.clone()));
        PipelineError::Broadcast(err)
    }
}
