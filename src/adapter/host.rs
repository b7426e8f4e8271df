//! Host environment probe
//!
//! The wallet is only usable inside a host that hands the app a launch token
//! (the opaque value the signing backend verifies on every call).

use crate::config::LAUNCH_TOKEN_ENV;
use zeroize::Zeroizing;

pub trait HostEnvironment: Send + Sync {
    /// The launch token, if running inside a supporting host
    fn launch_token(&self) -> Option<Zeroizing<String>>;
}

/// Reads the token from `INAPP_WALLET_LAUNCH_TOKEN`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvHost;

impl HostEnvironment for EnvHost {
    fn launch_token(&self) -> Option<Zeroizing<String>> {
        std::env::var(LAUNCH_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Zeroizing::new)
    }
}

/// A host with a fixed token, or none
pub struct StaticHost(Option<Zeroizing<String>>);

impl StaticHost {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self(Some(Zeroizing::new(token.into())))
    }

    pub fn absent() -> Self {
        Self(None)
    }
}

impl HostEnvironment for StaticHost {
    fn launch_token(&self) -> Option<Zeroizing<String>> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}
