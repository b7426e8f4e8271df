//! Instruction planning and ordering validation
//!
//! Every priced transaction is laid out as:
//! 1. `set_compute_unit_limit` (only when unit estimation succeeded)
//! 2. `set_compute_unit_price`
//! 3. The caller's instructions, untouched and in order

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// Hard ceiling the runtime accepts for a transaction's compute budget
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;

// Borsh variant indices of ComputeBudgetInstruction
const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;

/// Ordered instruction list with its budget prefix
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,

    /// Whether the first instruction is a compute-unit limit
    pub has_unit_limit: bool,

    /// Whether a compute-unit price was prepended
    pub has_unit_price: bool,
}

impl InstructionPlan {
    /// A plan with no budget prefix, used for unpriced transactions
    pub fn unpriced(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            has_unit_limit: false,
            has_unit_price: false,
        }
    }

    pub fn prefix_len(&self) -> usize {
        usize::from(self.has_unit_limit) + usize::from(self.has_unit_price)
    }
}

/// Prefix the caller's instructions with the compute budget.
///
/// # Arguments
///
/// * `cu_limit` - Estimated unit limit, `None` when estimation was unavailable
/// * `unit_price` - Priority fee in micro-lamports per compute unit
/// * `instructions` - The caller's instructions
///
/// # Errors
///
/// Returns `TransactionBuilderError::Configuration` if the limit exceeds
/// [`MAX_COMPUTE_UNITS`] or is zero.
pub fn plan_priced_instructions(
    cu_limit: Option<u32>,
    unit_price: u64,
    instructions: Vec<Instruction>,
) -> Result<InstructionPlan, TransactionBuilderError> {
    if let Some(limit) = cu_limit {
        if limit == 0 || limit > MAX_COMPUTE_UNITS {
            return Err(TransactionBuilderError::Configuration(format!(
                "Compute unit limit {} outside 1..={}",
                limit, MAX_COMPUTE_UNITS
            )));
        }
    }

    let mut planned = Vec::with_capacity(instructions.len() + 2);

    if let Some(limit) = cu_limit {
        planned.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
    }
    planned.push(ComputeBudgetInstruction::set_compute_unit_price(unit_price));
    planned.extend(instructions);

    Ok(InstructionPlan {
        instructions: planned,
        has_unit_limit: cu_limit.is_some(),
        has_unit_price: true,
    })
}

fn compute_budget_tag(ix: &Instruction) -> Option<u8> {
    if ix.program_id != solana_sdk::compute_budget::id() {
        return None;
    }
    ix.data.first().copied()
}

/// Validate the layout of a planned instruction list.
///
/// # Errors
///
/// Returns `TransactionBuilderError::InvalidInstructionOrder` if:
/// - The planned prefix is not where the plan says it is
/// - A caller instruction repeats a compute-unit limit or price, which the
///   runtime would reject as a duplicate
pub fn sanity_check_ix_order(plan: &InstructionPlan) -> Result<(), TransactionBuilderError> {
    let ixs = &plan.instructions;
    let mut expected = Vec::with_capacity(2);
    if plan.has_unit_limit {
        expected.push(SET_COMPUTE_UNIT_LIMIT_TAG);
    }
    if plan.has_unit_price {
        expected.push(SET_COMPUTE_UNIT_PRICE_TAG);
    }

    if ixs.len() < expected.len() {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Plan declares {} budget instructions but holds {}",
            expected.len(),
            ixs.len()
        )));
    }

    for (idx, tag) in expected.iter().enumerate() {
        if compute_budget_tag(&ixs[idx]) != Some(*tag) {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Expected compute budget instruction {} at position {}, got program_id: {}",
                tag, idx, ixs[idx].program_id
            )));
        }
    }

    for (idx, ix) in ixs.iter().enumerate().skip(expected.len()) {
        if let Some(tag) = compute_budget_tag(ix) {
            let duplicate = (tag == SET_COMPUTE_UNIT_LIMIT_TAG && plan.has_unit_limit)
                || (tag == SET_COMPUTE_UNIT_PRICE_TAG && plan.has_unit_price);
            if duplicate {
                return Err(TransactionBuilderError::invalid_order(format!(
                    "Duplicate compute budget instruction {} at position {}",
                    tag, idx
                )));
            }
        }
    }

    Ok(())
}
