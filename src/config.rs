//! Configuration for the in-app wallet
//!
//! Loaded from a TOML file with `.env` support. Every section except
//! `[wallet]` may be omitted and falls back to its defaults.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable carrying the host's verification token
pub const LAUNCH_TOKEN_ENV: &str = "INAPP_WALLET_LAUNCH_TOKEN";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Endpoints and application identity
    pub wallet: WalletConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Send budget and confirmation polling
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Compute budget estimation
    #[serde(default)]
    pub fees: FeesConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Chain JSON-RPC endpoint; must support the priority-fee and DAS extensions
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,

    /// Base URL of the remote signing backend
    #[serde(default = "default_backend_endpoint")]
    pub backend_endpoint: String,

    /// Namespaces remembered-session keys in the cache
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Seconds before an undecided request resolves as rejected
    #[serde(default = "default_approval_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Total budget for the send retry loop
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Deadline for the confirmation poll
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pause between failed send attempts (0 = retry immediately)
    #[serde(default)]
    pub send_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_max_compute_units")]
    pub max_compute_units: u32,

    /// Multiplier applied to simulated units
    #[serde(default = "default_compute_margin")]
    pub compute_margin: f64,

    #[serde(default = "default_min_compute_units")]
    pub min_compute_units: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// sled directory; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// TTL of owner asset listings
    #[serde(default = "default_asset_ttl")]
    pub asset_ttl_secs: u64,

    /// TTL of mint metadata used by the simulator
    #[serde(default = "default_ttl")]
    pub metadata_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_rpc_endpoint() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_backend_endpoint() -> String { "http://localhost:8080".to_string() }
fn default_app_name() -> String { "inapp-wallet".to_string() }
fn default_approval_timeout() -> u64 { 60 }
fn default_send_timeout() -> u64 { 60 }
fn default_confirm_timeout() -> u64 { 15 }
fn default_poll_interval() -> u64 { 5 }
fn default_max_compute_units() -> u32 { 1_400_000 }
fn default_compute_margin() -> f64 { 1.1 }
fn default_min_compute_units() -> u32 { 5_000 }
fn default_schema_version() -> String { crate::cache::CACHE_SCHEMA_VERSION.to_string() }
fn default_ttl() -> u64 { 60 * 60 }
fn default_asset_ttl() -> u64 { 5 * 60 }
fn default_log_level() -> String { "inapp_wallet=info".to_string() }

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: default_rpc_endpoint(),
            backend_endpoint: default_backend_endpoint(),
            app_name: default_app_name(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_secs: default_poll_interval(),
            send_retry_delay_ms: 0,
        }
    }
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            max_compute_units: default_max_compute_units(),
            compute_margin: default_compute_margin(),
            min_compute_units: default_min_compute_units(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            schema_version: default_schema_version(),
            default_ttl_secs: default_ttl(),
            asset_ttl_secs: default_asset_ttl(),
            metadata_ttl_secs: default_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: default_log_level(),
        }
    }
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BroadcastConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn send_retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn asset_ttl(&self) -> Duration {
        Duration::from_secs(self.asset_ttl_secs)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after pulling `.env` into the environment
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wallet.rpc_endpoint.trim().is_empty() {
            bail!("wallet.rpc_endpoint cannot be empty");
        }
        if self.wallet.backend_endpoint.trim().is_empty() {
            bail!("wallet.backend_endpoint cannot be empty");
        }
        if self.wallet.app_name.trim().is_empty() {
            bail!("wallet.app_name cannot be empty");
        }
        if self.approval.timeout_secs == 0 {
            bail!("approval.timeout_secs must be greater than 0");
        }
        if self.broadcast.send_timeout_secs == 0 || self.broadcast.confirm_timeout_secs == 0 {
            bail!("broadcast timeouts must be greater than 0");
        }
        if self.broadcast.poll_interval_secs == 0 {
            bail!("broadcast.poll_interval_secs must be greater than 0");
        }
        if self.fees.compute_margin < 1.0 {
            bail!("fees.compute_margin must be at least 1.0");
        }
        if self.fees.min_compute_units > self.fees.max_compute_units {
            bail!("fees.min_compute_units exceeds fees.max_compute_units");
        }
        if self.fees.max_compute_units > crate::tx_builder::MAX_COMPUTE_UNITS {
            bail!(
                "fees.max_compute_units cannot exceed {}",
                crate::tx_builder::MAX_COMPUTE_UNITS
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast.send_timeout(), Duration::from_secs(60));
        assert_eq!(config.broadcast.confirm_timeout(), Duration::from_secs(15));
        assert_eq!(config.broadcast.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.approval.timeout(), Duration::from_secs(60));
        assert_eq!(config.cache.asset_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[wallet]
rpc_endpoint = "https://rpc.example.invalid"
backend_endpoint = "https://signer.example.invalid"
app_name = "demo_bot"

[broadcast]
confirm_timeout_secs = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.wallet.app_name, "demo_bot");
        assert_eq!(config.broadcast.confirm_timeout_secs, 60);
        assert_eq!(config.broadcast.send_timeout_secs, 60);
        assert_eq!(config.fees.min_compute_units, 5_000);
        assert_eq!(config.cache.schema_version, "v1.0");
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = Config::default();
        config.broadcast.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.wallet.backend_endpoint = " ".to_string();
        assert!(config.validate().is_err());
    }
}
