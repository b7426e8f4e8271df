use thiserror::Error;

/// Cache failures. None of these escape the cache: they are logged and the
/// cache degrades to in-memory behaviour.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The durable store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// The stored map could not be decoded
    #[error("Corrupt cache blob: {0}")]
    Corrupt(String),

    /// A value could not be converted to or from its serialized payload
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Corrupt(_) => "corrupt",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
