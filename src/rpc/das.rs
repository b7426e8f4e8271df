//! Asset-indexing (DAS) response shapes
//!
//! Only the fields the wallet reads are modelled; everything else in the
//! provider's payload is ignored. All fields default so that sparse indexer
//! records still decode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DasAsset {
    pub id: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub content: Option<AssetContent>,
    #[serde(default)]
    pub token_info: Option<TokenInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetContent {
    #[serde(default)]
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub links: Option<ContentLinks>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentLinks {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub token_program: Option<String>,
    #[serde(default)]
    pub price_info: Option<PriceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    #[serde(default)]
    pub price_per_token: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeBalance {
    #[serde(default)]
    pub lamports: u64,
    #[serde(default)]
    pub price_per_sol: Option<f64>,
    #[serde(default)]
    pub total_price: Option<f64>,
}

/// `getAssetsByOwner` result page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetsByOwner {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub items: Vec<DasAsset>,
    #[serde(rename = "nativeBalance", default)]
    pub native_balance: Option<NativeBalance>,
}

impl DasAsset {
    pub fn name(&self) -> Option<&str> {
        self.content.as_ref()?.metadata.name.as_deref()
    }

    /// Symbol from the content metadata, falling back to the token info
    pub fn symbol(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|c| c.metadata.symbol.as_deref())
            .or_else(|| self.token_info.as_ref()?.symbol.as_deref())
    }

    pub fn image(&self) -> Option<&str> {
        self.content.as_ref()?.links.as_ref()?.image.as_deref()
    }

    pub fn decimals(&self) -> Option<u8> {
        self.token_info.as_ref().map(|t| t.decimals)
    }
}
