//! Transaction builder
//!
//! Turns a caller's instruction list into a priced, versioned transaction
//! and passes it to an async signing function.
//!
//! ## Layout
//! - **errors**: error taxonomy with retry and category hooks
//! - **fees**: concurrent compute-unit and priority-fee estimation
//! - **instructions**: budget-prefix planning and ordering validation
//! - **simulate**: estimation transactions and unsigned assembly
//! - **builder**: the orchestrating [`TransactionBuilder`]
//!
//! ## Instruction order
//! `[set_compute_unit_limit?, set_compute_unit_price, caller instructions...]`.
//! The limit is present only when the unit simulation succeeded; the price is
//! always present for a non-empty instruction list.

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod fees;
mod instructions;
mod simulate;

pub use builder::TransactionBuilder;
pub use fees::{FeeEstimate, FeeEstimator};
pub use instructions::{
    plan_priced_instructions, sanity_check_ix_order, InstructionPlan, MAX_COMPUTE_UNITS,
};
pub use simulate::compile_unsigned;
