//! Throwaway transactions for estimation and the final unsigned assembly
//!
//! Estimation transactions use a placeholder blockhash and placeholder
//! signatures; the RPC replaces the blockhash and skips signature checks, so
//! they never need a round trip for a real blockhash.

use crate::tx_builder::{errors::TransactionBuilderError, instructions::MAX_COMPUTE_UNITS};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

/// Compile a v0 transaction with one placeholder signature per required signer
pub fn compile_unsigned(
    instructions: &[Instruction],
    payer: &Pubkey,
    lookup_tables: &[AddressLookupTableAccount],
    recent_blockhash: Hash,
) -> Result<VersionedTransaction, TransactionBuilderError> {
    let message = v0::Message::try_compile(payer, instructions, lookup_tables, recent_blockhash)
        .map_err(|e| TransactionBuilderError::compile_failed(e.to_string()))?;

    let num_signatures = message.header.num_required_signatures as usize;
    Ok(VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: VersionedMessage::V0(message),
    })
}

/// The unit-estimation transaction: caller instructions behind a maximal
/// compute-unit limit so the simulation is never cut short by the default budget
pub fn build_unit_estimation_tx(
    instructions: &[Instruction],
    payer: &Pubkey,
    lookup_tables: &[AddressLookupTableAccount],
) -> Result<VersionedTransaction, TransactionBuilderError> {
    let mut sim_ixs = Vec::with_capacity(instructions.len() + 1);
    sim_ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(MAX_COMPUTE_UNITS));
    sim_ixs.extend_from_slice(instructions);
    compile_unsigned(&sim_ixs, payer, lookup_tables, Hash::default())
}

/// The fee-estimation transaction: caller instructions as they are
pub fn build_fee_estimation_tx(
    instructions: &[Instruction],
    payer: &Pubkey,
    lookup_tables: &[AddressLookupTableAccount],
) -> Result<VersionedTransaction, TransactionBuilderError> {
    compile_unsigned(instructions, payer, lookup_tables, Hash::default())
}
