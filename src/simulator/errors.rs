use crate::rpc::RpcError;
use thiserror::Error;

/// Balance-diff simulation failures.
///
/// Individual accounts that fail to decode are not errors; they are dropped
/// from the result.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    /// The chain rejected the transaction in the dry run
    #[error("Transaction rejected in simulation: {err}")]
    Rejected { err: String, logs: Vec<String> },

    /// Pre-state fetch or simulation call failed
    #[error("RPC error during simulation: {0}")]
    Rpc(#[from] RpcError),

    /// The RPC returned a different number of accounts than requested
    #[error("Expected {expected} accounts from {source_name}, got {actual}")]
    AccountCountMismatch {
        source_name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The transaction has no fee payer to attribute changes to
    #[error("Transaction has no account keys")]
    NoFeePayer,
}

impl SimulationError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Rpc(_) => "rpc",
            Self::AccountCountMismatch { .. } => "malformed",
            Self::NoFeePayer => "validation",
        }
    }
}
