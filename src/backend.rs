//! Remote signing backend
//!
//! The custodial key lives behind an HTTP service. Every call carries the
//! host's verification token; transactions and messages travel base64-encoded.
//! Any non-2xx response is a hard failure, except a 404 from the key lookup,
//! which means the user has no key yet.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The request never produced a response
    #[error("Backend transport error on {path}: {message}")]
    Transport { path: String, message: String },

    /// The backend answered with a non-success status
    #[error("Backend returned {status} on {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("Malformed backend response on {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Backend returned an invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

impl BackendError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::InvalidPublicKey(_) => "public_key",
            Self::Encode(_) => "encode",
        }
    }
}

#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Look up the user's key; `None` if the user has none yet
    async fn get_public_key(&self, token: &str) -> Result<Option<Pubkey>, BackendError>;

    /// Provision a key for the user
    async fn create_public_key(&self, token: &str) -> Result<Option<Pubkey>, BackendError>;

    /// Sign every transaction, returning them in the same order
    async fn sign_transactions(
        &self,
        token: &str,
        txs: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, BackendError>;

    /// Sign raw message bytes, returning the signature bytes
    async fn sign_message(&self, token: &str, message: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// End the remote session, if the backend keeps one
    async fn disconnect(&self, _token: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    #[serde(default)]
    public_key: Option<String>,
}

/// [`SigningBackend`] over the HTTP API
pub struct HttpSigningBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSigningBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Encode(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn verification(token: &str) -> String {
        format!("tma {}", token)
    }

    async fn post_raw(&self, path: &str, body: Value) -> Result<reqwest::Response, BackendError> {
        trace!(path, "Backend request");
        self.http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|e| BackendError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn public_key_call(
        &self,
        path: &str,
        token: &str,
        missing_is_none: bool,
    ) -> Result<Option<Pubkey>, BackendError> {
        let response = self
            .post_raw(path, json!({ "verification": Self::verification(token) }))
            .await?;

        if missing_is_none && response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(path, "No key registered for user");
            return Ok(None);
        }

        let body: PublicKeyResponse = Self::decode(path, response).await?;
        match body.public_key.filter(|k| !k.is_empty()) {
            Some(key) => Pubkey::from_str(&key)
                .map(Some)
                .map_err(|_| BackendError::InvalidPublicKey(key)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SigningBackend for HttpSigningBackend {
    async fn get_public_key(&self, token: &str) -> Result<Option<Pubkey>, BackendError> {
        self.public_key_call("/getPublicKey", token, true).await
    }

    async fn create_public_key(&self, token: &str) -> Result<Option<Pubkey>, BackendError> {
        self.public_key_call("/createPublicKey", token, false).await
    }

    async fn sign_transactions(
        &self,
        token: &str,
        txs: &[VersionedTransaction],
    ) -> Result<Vec<VersionedTransaction>, BackendError> {
        const PATH: &str = "/signTransaction";

        let encoded = txs
            .iter()
            .map(|tx| {
                bincode::serialize(tx)
                    .map(|bytes| BASE64.encode(bytes))
                    .map_err(|e| BackendError::Encode(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .post_raw(
                PATH,
                json!({ "verification": Self::verification(token), "txs": encoded }),
            )
            .await?;
        let signed: Vec<String> = Self::decode(PATH, response).await?;

        if signed.len() != txs.len() {
            return Err(BackendError::Decode {
                path: PATH.to_string(),
                message: format!("sent {} transactions, got {} back", txs.len(), signed.len()),
            });
        }

        signed
            .iter()
            .map(|b64| {
                let bytes = BASE64.decode(b64).map_err(|e| BackendError::Decode {
                    path: PATH.to_string(),
                    message: e.to_string(),
                })?;
                bincode::deserialize::<VersionedTransaction>(&bytes).map_err(|e| {
                    BackendError::Decode {
                        path: PATH.to_string(),
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    }

    async fn sign_message(&self, token: &str, message: &[u8]) -> Result<Vec<u8>, BackendError> {
        const PATH: &str = "/signMessage";

        let response = self
            .post_raw(
                PATH,
                json!({ "verification": Self::verification(token), "msg": BASE64.encode(message) }),
            )
            .await?;
        let signature: String = Self::decode(PATH, response).await?;

        BASE64.decode(signature).map_err(|e| BackendError::Decode {
            path: PATH.to_string(),
            message: e.to_string(),
        })
    }
}
