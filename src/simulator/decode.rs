//! Account-state decoding for balance diffs
//!
//! Each inspected account is classified by its owning program: token
//! accounts of either token program generation are decoded as SPL token
//! records; everything else is treated as a native balance. Accounts that do
//! not decode are skipped.

use super::types::{AssetChange, AssetKind, TokenProgram};
use solana_sdk::{account::Account, pubkey, pubkey::Pubkey, system_program};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Account as TokenAccount;

pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Discriminator byte written after the base layout by extended token accounts
const TOKEN_2022_ACCOUNT_TYPE: u8 = 2;

/// Programs whose keys never hold user balances
pub fn is_known_program(key: &Pubkey) -> bool {
    *key == spl_token::id()
        || *key == TOKEN_2022_PROGRAM_ID
        || *key == solana_sdk::compute_budget::id()
        || *key == system_program::id()
        || *key == spl_associated_token_account::id()
}

pub fn token_program_of(owner: &Pubkey) -> Option<TokenProgram> {
    if *owner == spl_token::id() {
        Some(TokenProgram::Legacy)
    } else if *owner == TOKEN_2022_PROGRAM_ID {
        Some(TokenProgram::Token2022)
    } else {
        None
    }
}

/// Decode the base token-account record.
///
/// Legacy accounts are exactly `TokenAccount::LEN` bytes. Extended accounts
/// carry the same base layout followed by an account-type byte and TLV
/// extensions; mints of the extended program share the owner, so the type
/// byte is what tells them apart.
pub fn decode_token_account(program: TokenProgram, data: &[u8]) -> Option<TokenAccount> {
    let base = data.get(..TokenAccount::LEN)?;
    match program {
        TokenProgram::Legacy if data.len() != TokenAccount::LEN => return None,
        TokenProgram::Token2022 if data.len() > TokenAccount::LEN => {
            if data[TokenAccount::LEN] != TOKEN_2022_ACCOUNT_TYPE {
                return None;
            }
        }
        _ => {}
    }
    TokenAccount::unpack(base).ok()
}

/// Compute the change for one account as seen by `requester`.
///
/// Returns `None` when the account does not belong to `requester`, does not
/// decode, or did not change.
pub fn diff_account(
    key: &Pubkey,
    pre: Option<&Account>,
    post: Option<&Account>,
    requester: &Pubkey,
) -> Option<AssetChange> {
    let owner = pre.or(post).map(|a| a.owner)?;

    let (kind, before, after) = match token_program_of(&owner) {
        Some(program) => {
            let pre_token = match pre {
                Some(a) => Some(decode_token_account(program, &a.data)?),
                None => None,
            };
            let post_token = match post {
                Some(a) if a.owner == owner && !a.data.is_empty() => {
                    Some(decode_token_account(program, &a.data)?)
                }
                _ => None,
            };

            let record = pre_token.as_ref().or(post_token.as_ref())?;
            if record.owner != *requester {
                return None;
            }

            let kind = AssetKind::Token {
                program,
                mint: record.mint,
            };
            (
                kind,
                pre_token.map_or(0, |t| t.amount),
                post_token.map_or(0, |t| t.amount),
            )
        }
        None => {
            if key != requester {
                return None;
            }
            (
                AssetKind::Native,
                pre.map_or(0, |a| a.lamports),
                post.map_or(0, |a| a.lamports),
            )
        }
    };

    let delta = after as i128 - before as i128;
    if delta == 0 {
        return None;
    }

    Some(AssetChange {
        kind,
        account: *key,
        delta,
        metadata: None,
    })
}
