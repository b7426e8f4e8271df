use crate::rpc::DasAsset;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenProgram {
    /// The original SPL token program
    Legacy,
    /// The extended token program (token-2022)
    Token2022,
}

impl TokenProgram {
    pub fn id(self) -> Pubkey {
        match self {
            Self::Legacy => spl_token::id(),
            Self::Token2022 => super::decode::TOKEN_2022_PROGRAM_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Native,
    Token { program: TokenProgram, mint: Pubkey },
}

impl AssetKind {
    pub fn mint(&self) -> Option<Pubkey> {
        match self {
            Self::Native => None,
            Self::Token { mint, .. } => Some(*mint),
        }
    }
}

/// Display metadata resolved from the asset indexer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub image: Option<String>,
}

impl AssetMetadata {
    pub fn native() -> Self {
        Self {
            symbol: Some("SOL".to_string()),
            name: Some("Solana".to_string()),
            decimals: Some(9),
            image: None,
        }
    }
}

impl From<&DasAsset> for AssetMetadata {
    fn from(asset: &DasAsset) -> Self {
        Self {
            symbol: asset.symbol().map(str::to_string),
            name: asset.name().map(str::to_string),
            decimals: asset.decimals(),
            image: asset.image().map(str::to_string),
        }
    }
}

/// One balance change the requester would see if the transaction landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetChange {
    pub kind: AssetKind,
    /// The account whose balance changes (wallet or token account)
    pub account: Pubkey,
    /// `post - pre` in base units
    pub delta: i128,
    pub metadata: Option<AssetMetadata>,
}

impl AssetChange {
    pub fn is_native(&self) -> bool {
        self.kind == AssetKind::Native
    }

    /// Delta scaled by the known decimals, if any
    pub fn ui_amount(&self) -> Option<f64> {
        let decimals = self.metadata.as_ref()?.decimals?;
        Some(self.delta as f64 / 10f64.powi(decimals as i32))
    }
}
