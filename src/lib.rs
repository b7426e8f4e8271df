//! In-app custodial wallet core
//!
//! Builds fee-optimised transactions, gates every signature behind an
//! explicit user approval, delegates signing to a remote backend, broadcasts
//! with bounded retry and confirmation windows, and previews balance changes
//! by dry-running transactions against the chain.

pub mod adapter;
pub mod approval;
pub mod backend;
pub mod broadcast;
pub mod cache;
pub mod compat;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod portfolio;
pub mod rpc;
pub mod simulator;
pub mod transfer;
pub mod tx_builder;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use adapter::{InAppWallet, WalletError, WalletEvent};
pub use approval::{ApprovalDecision, ApprovalGate, ApprovalView};
pub use broadcast::{BroadcastError, Broadcaster};
pub use cache::PersistentCache;
pub use config::Config;
pub use pipeline::{PipelineError, WalletPipeline};
pub use simulator::{AssetChange, BalanceDiffSimulator};
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
