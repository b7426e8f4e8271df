//! Error types for the transaction builder
//!
//! Covers the build lifecycle: fee and compute estimation, blockhash
//! retrieval, message compilation and the caller-supplied signing step.

use crate::adapter::WalletError;
use crate::rpc::RpcError;
use thiserror::Error;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// The priority fee estimate could not be obtained.
    ///
    /// Fatal to the build: there is no default price, since guessing low
    /// risks the transaction being dropped under congestion.
    #[error("Priority fee estimation failed: {0}")]
    PriorityFee(#[source] RpcError),

    /// Fetching the recent blockhash failed
    #[error("Blockhash error: {0}")]
    Blockhash(#[source] RpcError),

    /// Dry-run simulation failed in a way that should stop the build
    #[error("Simulation failed: {0}")]
    Simulation(String),

    /// Invalid instruction order or structure
    ///
    /// Compute budget instructions must precede every caller instruction,
    /// with the unit limit (if any) ahead of the unit price.
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// The v0 message could not be compiled
    ///
    /// This includes:
    /// - Too many account keys without lookup tables
    /// - Lookup table indices out of range
    #[error("Message compilation failed: {0}")]
    Compile(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The signing function rejected or failed the transaction
    #[error("Signing failed: {0}")]
    Signing(#[from] WalletError),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    ///
    /// Returns `true` if rebuilding might succeed, `false` if the error is
    /// fatal or a decision made by the user.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PriorityFee(e) | Self::Blockhash(e) => e.is_retryable(),
            Self::Simulation(msg) => !msg.contains("insufficient") && !msg.contains("balance"),

            Self::InvalidInstructionOrder(_) => false,
            Self::Compile(_) => false,
            Self::Configuration(_) => false,
            Self::Signing(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::PriorityFee(_) => "priority_fee",
            Self::Blockhash(_) => "blockhash",
            Self::Simulation(_) => "simulation",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Compile(_) => "compile",
            Self::Configuration(_) => "config",
            Self::Signing(_) => "signing",
            Self::Internal(_) => "internal",
        }
    }

    /// True when the signing step failed because the user said no
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Signing(WalletError::UserRejected))
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn simulation_failed(reason: impl Into<String>) -> Self {
        Self::Simulation(reason.into())
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    pub fn compile_failed(reason: impl Into<String>) -> Self {
        Self::Compile(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}
