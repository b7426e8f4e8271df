//! Fee & compute estimation
//!
//! Runs the unit simulation and the priority-fee query concurrently. The unit
//! estimate is best-effort; the fee estimate is mandatory.

use crate::config::FeesConfig;
use crate::metrics::metrics;
use crate::rpc::ChainRpc;
use crate::tx_builder::{errors::TransactionBuilderError, simulate};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount, instruction::Instruction, pubkey::Pubkey,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one estimation round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    /// Compute-unit limit with margin applied, `None` when simulation failed
    pub unit_limit: Option<u32>,
    /// Micro-lamports per compute unit
    pub unit_price: u64,
    /// Raw units the simulation reported
    pub units_consumed: Option<u64>,
}

pub struct FeeEstimator {
    rpc: Arc<dyn ChainRpc>,
    config: FeesConfig,
}

impl FeeEstimator {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: FeesConfig) -> Self {
        Self { rpc, config }
    }

    /// Estimate the budget for `instructions` paid by `payer`.
    ///
    /// # Errors
    ///
    /// `PriorityFee` when the fee call fails; estimation transactions that
    /// cannot be compiled surface as `Compile`.
    pub async fn estimate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<FeeEstimate, TransactionBuilderError> {
        let unit_tx = simulate::build_unit_estimation_tx(instructions, payer, lookup_tables)?;
        let fee_tx = simulate::build_fee_estimation_tx(instructions, payer, lookup_tables)?;

        let (units_consumed, fee) = tokio::join!(
            self.simulate_units(&unit_tx),
            self.rpc.get_priority_fee_estimate(&fee_tx)
        );

        let unit_price = fee.map_err(|e| {
            warn!(
                error = %e,
                retryable = e.is_retryable(),
                "Priority fee estimate unavailable, aborting build"
            );
            TransactionBuilderError::PriorityFee(e)
        })?;

        let unit_limit = units_consumed.map(|units| self.apply_margin(units));

        debug!(
            ?units_consumed,
            ?unit_limit,
            unit_price,
            "Fee estimation complete"
        );

        Ok(FeeEstimate {
            unit_limit,
            unit_price,
            units_consumed,
        })
    }

    /// Units consumed by a dry run, or `None` if the simulation failed
    async fn simulate_units(&self, tx: &VersionedTransaction) -> Option<u64> {
        match self.rpc.simulate_transaction(tx, None).await {
            Ok(sim) if sim.err.is_none() => sim.units_consumed,
            Ok(sim) => {
                debug!(error = ?sim.err, "Unit simulation reported failure, proceeding without limit");
                metrics().unit_estimate_failures.inc();
                None
            }
            Err(e) => {
                debug!(error = %e, "Unit simulation call failed, proceeding without limit");
                metrics().unit_estimate_failures.inc();
                None
            }
        }
    }

    /// `max(ceil(units * margin), min_units)`, capped at the runtime maximum
    pub fn apply_margin(&self, units: u64) -> u32 {
        // Margin is applied in permille so that 1.1 scales exactly
        let permille = (self.config.compute_margin * 1000.0).round().max(0.0) as u64;
        let with_margin = units.saturating_mul(permille).div_ceil(1000);
        with_margin
            .max(self.config.min_compute_units as u64)
            .min(self.config.max_compute_units as u64) as u32
    }
}
