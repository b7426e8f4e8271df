//! Compatibility layer for Solana SDK message types
//!
//! Solana has two message formats (Legacy and V0) with different APIs for
//! the same information. The simulator, the signer and the broadcaster all
//! need account keys, required signers and the primary signature regardless
//! of which format the caller handed in, so they go through this module.

use solana_sdk::{
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

/// Get the message header from a `VersionedMessage`.
#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Get the static account keys from a `VersionedMessage`.
///
/// For V0 messages this does not include addresses loaded from lookup
/// tables; those are resolved by the runtime and are never state the
/// wallet owner signs for directly.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Get the accounts that must sign the message (always the first N keys)
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let header = get_message_header(message);
    let account_keys = get_static_account_keys(message);
    let num_signers = header.num_required_signatures as usize;

    &account_keys[..num_signers.min(account_keys.len())]
}

/// The fee payer is the first static account key
#[inline]
#[must_use]
pub fn get_fee_payer(message: &VersionedMessage) -> Option<Pubkey> {
    get_static_account_keys(message).first().copied()
}

/// The transaction id: the fee payer's signature
#[inline]
#[must_use]
pub fn get_primary_signature(tx: &VersionedTransaction) -> Option<Signature> {
    tx.signatures
        .first()
        .copied()
        .filter(|sig| *sig != Signature::default())
}
