//! Core TransactionBuilder implementation
//!
//! Orchestrates estimation, instruction planning, blockhash retrieval and
//! compilation, then hands the frozen transaction to the caller's signer.

use crate::adapter::WalletError;
use crate::config::FeesConfig;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::tx_builder::{
    errors::TransactionBuilderError,
    fees::FeeEstimator,
    instructions::{plan_priced_instructions, sanity_check_ix_order, InstructionPlan},
    simulate,
};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, instruction::Instruction, pubkey::Pubkey,
    transaction::VersionedTransaction,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

pub struct TransactionBuilder {
    rpc: Arc<dyn ChainRpc>,
    estimator: FeeEstimator,
}

impl TransactionBuilder {
    pub fn new(rpc: Arc<dyn ChainRpc>, fees: FeesConfig) -> Self {
        Self {
            estimator: FeeEstimator::new(rpc.clone(), fees),
            rpc,
        }
    }

    /// Build, price and sign a v0 transaction.
    ///
    /// An empty instruction list is not priced. The blockhash is fetched on
    /// every call, after estimation, so it is as fresh as possible when
    /// `sign` runs. Whatever `sign` returns is returned unchanged.
    #[instrument(skip_all, fields(instructions = instructions.len(), payer = %payer))]
    pub async fn build<F, Fut>(
        &self,
        instructions: Vec<Instruction>,
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
        sign: F,
    ) -> Result<VersionedTransaction, TransactionBuilderError>
    where
        F: FnOnce(VersionedTransaction) -> Fut,
        Fut: Future<Output = Result<VersionedTransaction, WalletError>>,
    {
        let unsigned = self.build_unsigned(instructions, payer, lookup_tables).await?;
        let signed = sign(unsigned).await?;
        Ok(signed)
    }

    /// Everything [`build`](Self::build) does short of signing
    pub async fn build_unsigned(
        &self,
        instructions: Vec<Instruction>,
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<VersionedTransaction, TransactionBuilderError> {
        let started = Instant::now();

        let plan = if instructions.is_empty() {
            InstructionPlan::unpriced(instructions)
        } else {
            let estimate = self
                .estimator
                .estimate(&instructions, payer, lookup_tables)
                .await?;
            plan_priced_instructions(estimate.unit_limit, estimate.unit_price, instructions)?
        };
        sanity_check_ix_order(&plan)?;

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(TransactionBuilderError::Blockhash)?;

        let unsigned =
            simulate::compile_unsigned(&plan.instructions, payer, lookup_tables, blockhash)?;

        metrics()
            .build_latency
            .observe(started.elapsed().as_secs_f64());
        debug!(
            %blockhash,
            has_unit_limit = plan.has_unit_limit,
            total_instructions = plan.instructions.len(),
            "Transaction assembled"
        );

        Ok(unsigned)
    }
}
