use super::{
    das::{AssetsByOwner, DasAsset},
    ChainRpc, ConfirmationLevel, RpcError, SignatureState, SimulatedTransaction,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcSimulateTransactionAccountsConfig, RpcSimulateTransactionConfig},
    rpc_request::RpcRequest,
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// getMultipleAccounts accepts at most this many keys per call
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorityFeeResult {
    priority_fee_estimate: Option<f64>,
}

/// [`ChainRpc`] over a Solana JSON-RPC endpoint.
///
/// Standard methods go through the `solana-client` nonblocking client; the
/// provider extensions (priority fee, asset indexing) are plain JSON-RPC
/// posts over `reqwest` to the same endpoint.
pub struct SolanaRpc {
    client: RpcClient,
    http: reqwest::Client,
    endpoint: String,
}

impl SolanaRpc {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(RpcError::Validation("RPC endpoint cannot be empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Validation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: RpcClient::new_with_commitment(endpoint.clone(), CommitmentConfig::confirmed()),
            http,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn json_rpc<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        trace!(method, endpoint = %self.endpoint, "JSON-RPC request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&JsonRpcRequest {
                jsonrpc: "2.0",
                id: "inapp-wallet",
                method,
                params,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RpcError::from_http_error(e, &self.endpoint))?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcError::malformed(method, e.to_string()))?;

        if let Some(err) = body.error {
            return Err(RpcError::RpcResponse {
                endpoint: self.endpoint.clone(),
                message: err.message,
                code: Some(err.code),
            });
        }

        body.result
            .ok_or_else(|| RpcError::malformed(method, "missing result"))
    }

    fn encode_tx(tx: &VersionedTransaction) -> Result<String, RpcError> {
        bincode::serialize(tx)
            .map(|bytes| BASE64.encode(bytes))
            .map_err(|e| RpcError::Validation(format!("failed to serialize transaction: {e}")))
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn get_latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| RpcError::from_client_error(e, &self.endpoint))
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        accounts: Option<&[Pubkey]>,
    ) -> Result<SimulatedTransaction, RpcError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::confirmed()),
            encoding: Some(UiTransactionEncoding::Base64),
            accounts: accounts.map(|keys| RpcSimulateTransactionAccountsConfig {
                encoding: Some(UiAccountEncoding::Base64),
                addresses: keys.iter().map(|k| k.to_string()).collect(),
            }),
            ..Default::default()
        };

        let result = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| RpcError::from_client_error(e, &self.endpoint))?
            .value;

        let accounts = result
            .accounts
            .unwrap_or_default()
            .into_iter()
            .map(|ui| ui.and_then(|ui| ui.decode::<Account>()))
            .collect();

        Ok(SimulatedTransaction {
            err: result.err.map(|err| format!("{:?}", err)),
            units_consumed: result.units_consumed,
            accounts,
            logs: result.logs.unwrap_or_default(),
        })
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<Signature, RpcError> {
        let params = json!([
            BASE64.encode(wire),
            { "skipPreflight": true, "encoding": "base64" }
        ]);

        let raw: String = self
            .client
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(|e| RpcError::from_client_error(e, &self.endpoint))?;

        Signature::from_str(&raw).map_err(|e| RpcError::malformed("sendTransaction", e.to_string()))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureState>, RpcError> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| RpcError::from_client_error(e, &self.endpoint))?
            .value;

        Ok(statuses.into_iter().next().flatten().map(|status| SignatureState {
            level: status.confirmation_status.map(|s| match s {
                TransactionConfirmationStatus::Processed => ConfirmationLevel::Processed,
                TransactionConfirmationStatus::Confirmed => ConfirmationLevel::Confirmed,
                TransactionConfirmationStatus::Finalized => ConfirmationLevel::Finalized,
            }),
            err: status.err.map(|err| format!("{:?}", err)),
        }))
    }

    async fn get_multiple_accounts(
        &self,
        keys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, RpcError> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let accounts = self
                .client
                .get_multiple_accounts(chunk)
                .await
                .map_err(|e| RpcError::from_client_error(e, &self.endpoint))?;
            out.extend(accounts);
        }
        Ok(out)
    }

    async fn get_priority_fee_estimate(&self, tx: &VersionedTransaction) -> Result<u64, RpcError> {
        let params = json!([{
            "transaction": Self::encode_tx(tx)?,
            "options": { "recommended": true, "transactionEncoding": "base64" }
        }]);

        let result: PriorityFeeResult = self.json_rpc("getPriorityFeeEstimate", params).await?;
        let estimate = result
            .priority_fee_estimate
            .filter(|fee| fee.is_finite() && *fee >= 0.0)
            .ok_or_else(|| RpcError::malformed("getPriorityFeeEstimate", "missing priorityFeeEstimate"))?;

        debug!(estimate, "Priority fee estimate");
        Ok(estimate.ceil() as u64)
    }

    async fn get_asset_batch(&self, ids: &[Pubkey]) -> Result<Vec<Option<DasAsset>>, RpcError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|k| k.to_string()).collect();
        self.json_rpc("getAssetBatch", json!({ "ids": ids })).await
    }

    async fn get_assets_by_owner(&self, owner: &Pubkey) -> Result<AssetsByOwner, RpcError> {
        let params = json!({
            "ownerAddress": owner.to_string(),
            "page": 1,
            "limit": 1000,
            "displayOptions": {
                "showFungible": true,
                "showNativeBalance": true
            }
        });
        self.json_rpc("getAssetsByOwner", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(SolanaRpc::new(""), Err(RpcError::Validation(_))));
    }

    #[test]
    fn test_request_envelope_shape() {
        let body = serde_json::to_value(JsonRpcRequest {
            jsonrpc: "2.0",
            id: "inapp-wallet",
            method: "getAssetBatch",
            params: json!({ "ids": ["a"] }),
        })
        .unwrap();

        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "getAssetBatch");
        assert_eq!(body["params"]["ids"][0], "a");
    }
}
