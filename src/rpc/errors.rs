use solana_client::client_error::ClientError;
use thiserror::Error;

/// Chain RPC error types
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout (endpoint: {endpoint})")]
    Timeout { endpoint: String },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// The response parsed but did not have the expected shape
    #[error("Malformed response from {method}: {message}")]
    MalformedResponse { method: String, message: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::RateLimitExceeded { .. } => true,
            RpcError::BlockhashNotFound { .. } => true,

            RpcError::TransactionExpired { .. } => false,
            RpcError::InsufficientFunds { .. } => false,
            RpcError::MalformedResponse { .. } => false,
            RpcError::Validation(_) => false,

            // Retry on server errors (5xx)
            RpcError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Category for metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            RpcError::Transport { .. } => "transport",
            RpcError::Timeout { .. } => "timeout",
            RpcError::RpcResponse { .. } => "rpc_response",
            RpcError::RateLimitExceeded { .. } => "rate_limit",
            RpcError::BlockhashNotFound { .. } => "blockhash",
            RpcError::TransactionExpired { .. } => "expired",
            RpcError::InsufficientFunds { .. } => "insufficient_funds",
            RpcError::MalformedResponse { .. } => "malformed",
            RpcError::Validation(_) => "validation",
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. }
            | RpcError::Timeout { endpoint }
            | RpcError::RpcResponse { endpoint, .. }
            | RpcError::RateLimitExceeded { endpoint }
            | RpcError::BlockhashNotFound { endpoint }
            | RpcError::TransactionExpired { endpoint }
            | RpcError::InsufficientFunds { endpoint } => Some(endpoint),
            RpcError::MalformedResponse { .. } | RpcError::Validation(_) => None,
        }
    }

    pub fn malformed(method: &str, message: impl Into<String>) -> Self {
        RpcError::MalformedResponse {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        Self::classify(&err.to_string(), endpoint)
    }

    /// Create from a reqwest failure on one of the JSON-RPC extension methods
    pub fn from_http_error(err: reqwest::Error, endpoint: &str) -> Self {
        if err.is_timeout() {
            return RpcError::Timeout {
                endpoint: endpoint.to_string(),
            };
        }
        if err.status().map(|s| s.as_u16()) == Some(429) {
            return RpcError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            };
        }
        if err.is_connect() || err.is_request() {
            return RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            };
        }
        RpcError::RpcResponse {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
            code: err.status().map(|s| s.as_u16() as i64),
        }
    }

    /// Classify based on the error message
    fn classify(message: &str, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            RpcError::BlockhashNotFound { endpoint }
        } else if err_str.contains("transaction expired") || err_str.contains("block height exceeded")
        {
            RpcError::TransactionExpired { endpoint }
        } else if err_str.contains("insufficient funds") || err_str.contains("insufficient lamports")
        {
            RpcError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcError::Timeout { endpoint }
        } else if err_str.contains("connection refused") || err_str.contains("error sending request")
        {
            RpcError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_matches(|c: char| !c.is_ascii_digit() && c != '-').parse::<i64>().ok());

            RpcError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(RpcError::Timeout {
            endpoint: "test".to_string(),
        }
        .is_retryable());

        assert!(!RpcError::Validation("bad".to_string()).is_retryable());
        assert!(!RpcError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_error_endpoint() {
        let err = RpcError::Timeout {
            endpoint: "https://test.com".to_string(),
        };
        assert_eq!(err.endpoint(), Some("https://test.com"));
        assert_eq!(RpcError::malformed("getAssetBatch", "x").endpoint(), None);
    }

    #[test]
    fn test_classify_messages() {
        assert!(matches!(
            RpcError::classify("Blockhash not found", "e"),
            RpcError::BlockhashNotFound { .. }
        ));
        assert!(matches!(
            RpcError::classify("HTTP status client error (429 Too Many Requests)", "e"),
            RpcError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            RpcError::classify("operation timed out", "e"),
            RpcError::Timeout { .. }
        ));

        match RpcError::classify("RPC response error code: 503 unavailable", "e") {
            RpcError::RpcResponse { code, .. } => assert_eq!(code, Some(503)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_server_errors_retryable() {
        let err = RpcError::RpcResponse {
            endpoint: "e".to_string(),
            message: "boom".to_string(),
            code: Some(502),
        };
        assert!(err.is_retryable());
        assert_eq!(err.category(), "rpc_response");
    }
}
