//! Error types for the wallet adapter
//!
//! These cross the event channel, so they are `Clone` and carry owned
//! context strings rather than the lower-level error values.

use crate::approval::ApprovalError;
use crate::broadcast::BroadcastError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
    /// The host environment did not provide a launch token
    #[error("Wallet not ready: host environment not detected")]
    NotReady,

    /// The verify-or-create backend call failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The backend answered but returned no account
    #[error("Backend returned no account for this user")]
    Account,

    #[error("Wallet not connected")]
    NotConnected,

    /// Rejected by the user, or the approval timed out
    #[error("User rejected the request")]
    UserRejected,

    #[error("Transaction signing failed: {0}")]
    SignTransaction(String),

    #[error("Message signing failed: {0}")]
    SignMessage(String),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// The remote disconnect call failed; local teardown still happened
    #[error("Disconnect failed: {0}")]
    Disconnection(String),

    /// The backend ended the session
    #[error("Wallet disconnected by remote")]
    Disconnected,

    #[error("Approval unavailable: {0}")]
    ApprovalBusy(#[from] ApprovalError),
}

impl WalletError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Connection(_) => "connection",
            Self::Account => "account",
            Self::NotConnected => "not_connected",
            Self::UserRejected => "user_rejected",
            Self::SignTransaction(_) => "sign_transaction",
            Self::SignMessage(_) => "sign_message",
            Self::Broadcast(e) => e.category(),
            Self::Disconnection(_) => "disconnection",
            Self::Disconnected => "disconnected",
            Self::ApprovalBusy(e) => e.category(),
        }
    }

    /// An expected outcome of asking the user, not a fault
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected)
    }
}
