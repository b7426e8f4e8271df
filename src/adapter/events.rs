use super::errors::WalletError;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Whether the host environment needed for signing is present.
///
/// Probed once when the adapter is constructed and never re-probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyState {
    NotDetected,
    Installed,
}

/// Session lifecycle as seen from outside the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Pubkey),
}

/// Notifications published to every subscriber, in the order they happen
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    Connect(Pubkey),
    Disconnect,
    Error(WalletError),
}
