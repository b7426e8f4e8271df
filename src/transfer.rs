//! Withdrawal planning
//!
//! Instruction lists for moving SOL or tokens out of the wallet. The result
//! goes straight into the transaction builder, which adds the compute-budget
//! prefix.

use crate::simulator::TokenProgram;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer amount must be greater than zero")]
    ZeroAmount,

    #[error("Sender and recipient are the same account")]
    SelfTransfer,

    #[error("Failed to build token instruction: {0}")]
    Instruction(String),
}

/// A single system-program transfer
pub fn plan_native_transfer(
    from: &Pubkey,
    to: &Pubkey,
    lamports: u64,
) -> Result<Vec<Instruction>, TransferError> {
    if lamports == 0 {
        return Err(TransferError::ZeroAmount);
    }
    if from == to {
        return Err(TransferError::SelfTransfer);
    }
    #[allow(deprecated)]
    let ix = solana_sdk::system_instruction::transfer(from, to, lamports);
    Ok(vec![ix])
}

/// Create the recipient's associated account if needed, then `transfer_checked`
/// from the owner's associated account.
///
/// The recipient may be off-curve (a program-derived address).
pub fn plan_token_transfer(
    owner: &Pubkey,
    recipient: &Pubkey,
    mint: &Pubkey,
    program: TokenProgram,
    amount: u64,
    decimals: u8,
) -> Result<Vec<Instruction>, TransferError> {
    if amount == 0 {
        return Err(TransferError::ZeroAmount);
    }
    if owner == recipient {
        return Err(TransferError::SelfTransfer);
    }

    let program_id = program.id();
    let source = get_associated_token_address_with_program_id(owner, mint, &program_id);
    let destination = get_associated_token_address_with_program_id(recipient, mint, &program_id);

    let create_destination =
        create_associated_token_account_idempotent(owner, recipient, mint, &program_id);

    // Both token programs share the transfer_checked layout, but spl_token's
    // constructor rejects any other program id.
    let mut transfer = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source,
        mint,
        &destination,
        owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| TransferError::Instruction(e.to_string()))?;
    transfer.program_id = program_id;

    Ok(vec![create_destination, transfer])
}
