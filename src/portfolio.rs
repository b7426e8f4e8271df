//! Owner portfolio
//!
//! Fungible holdings from the asset indexer plus a synthetic native SOL
//! entry, cached per owner for a few minutes.

use crate::cache::PersistentCache;
use crate::rpc::{AssetsByOwner, ChainRpc, DasAsset, RpcError};
use crate::simulator::{TokenProgram, TOKEN_2022_PROGRAM_ID};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

pub const NATIVE_SOL_ID: &str = "native_sol";
const FUNGIBLE_INTERFACE: &str = "FungibleToken";
const SOL_DECIMALS: u8 = 9;
const SOL_IMAGE: &str =
    "https://upload.wikimedia.org/wikipedia/en/thumb/b/b9/Solana_logo.png/252px-Solana_logo.png";

pub fn portfolio_cache_key(owner: &Pubkey) -> String {
    format!("assets-{}", owner)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Mint address, or [`NATIVE_SOL_ID`]
    pub id: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image: Option<String>,
    /// Base units
    pub balance: u64,
    pub decimals: u8,
    pub price_per_token: Option<f64>,
    pub token_program: Option<String>,
}

impl Holding {
    fn native(balance: &AssetsByOwner) -> Self {
        let native = balance.native_balance.clone().unwrap_or_default();
        Self {
            id: NATIVE_SOL_ID.to_string(),
            name: Some("Solana".to_string()),
            symbol: Some("SOL".to_string()),
            image: Some(SOL_IMAGE.to_string()),
            balance: native.lamports,
            decimals: SOL_DECIMALS,
            price_per_token: native.price_per_sol,
            token_program: None,
        }
    }

    pub fn is_native(&self) -> bool {
        self.id == NATIVE_SOL_ID
    }

    /// `None` for native SOL or an unparseable id
    pub fn mint(&self) -> Option<Pubkey> {
        if self.is_native() {
            return None;
        }
        Pubkey::from_str(&self.id).ok()
    }

    /// Which token program owns this mint; legacy unless the indexer says otherwise
    pub fn program(&self) -> Option<TokenProgram> {
        if self.is_native() {
            return None;
        }
        match self.token_program.as_deref().map(Pubkey::from_str) {
            Some(Ok(id)) if id == TOKEN_2022_PROGRAM_ID => Some(TokenProgram::Token2022),
            _ => Some(TokenProgram::Legacy),
        }
    }

    pub fn ui_balance(&self) -> f64 {
        self.balance as f64 / 10f64.powi(self.decimals as i32)
    }

    pub fn value_usd(&self) -> f64 {
        self.ui_balance() * self.price_per_token.unwrap_or(0.0)
    }

    fn matches(&self, needle: &str) -> bool {
        let hit = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(needle))
        };
        hit(&self.name) || hit(&self.symbol)
    }
}

impl From<&DasAsset> for Holding {
    fn from(asset: &DasAsset) -> Self {
        let info = asset.token_info.clone().unwrap_or_default();
        Self {
            id: asset.id.clone(),
            name: asset.name().map(str::to_string),
            symbol: asset.symbol().map(str::to_string),
            image: asset.image().map(str::to_string),
            balance: info.balance,
            decimals: info.decimals,
            price_per_token: info.price_info.and_then(|p| p.price_per_token),
            token_program: info.token_program,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub owner: Pubkey,
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    /// Load the owner's holdings, from cache when fresh
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn fetch(
        rpc: &dyn ChainRpc,
        cache: &PersistentCache,
        ttl: Duration,
        owner: &Pubkey,
    ) -> Result<Self, RpcError> {
        let key = portfolio_cache_key(owner);
        if let Some(holdings) = cache.fetch::<Vec<Holding>>(&key) {
            debug!(count = holdings.len(), "Portfolio served from cache");
            return Ok(Self {
                owner: *owner,
                holdings,
            });
        }

        let page = rpc.get_assets_by_owner(owner).await?;
        let mut holdings: Vec<Holding> = page
            .items
            .iter()
            .filter(|a| a.interface == FUNGIBLE_INTERFACE)
            .map(Holding::from)
            .collect();
        holdings.push(Holding::native(&page));

        cache.put(&key, &holdings, ttl);
        debug!(count = holdings.len(), total = page.total, "Portfolio fetched");
        Ok(Self {
            owner: *owner,
            holdings,
        })
    }

    /// Drop the cached listing so the next fetch goes to the indexer
    pub fn invalidate(cache: &PersistentCache, owner: &Pubkey) {
        cache.clear(Some(&portfolio_cache_key(owner)));
    }

    /// Case-insensitive substring match on name or symbol; an empty query
    /// matches everything
    pub fn search(&self, query: &str) -> Vec<&Holding> {
        let needle = query.trim().to_lowercase();
        self.holdings
            .iter()
            .filter(|h| needle.is_empty() || h.matches(&needle))
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    pub fn total_value_usd(&self) -> f64 {
        self.holdings.iter().map(Holding::value_usd).sum()
    }
}
