//! Observability module for correlation and tracing

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ID for tracking a sign request across the approval gate,
/// the remote signer and the broadcaster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Span timing helper for pipeline stages.
///
/// Carries the correlation id of the request it measures so that the
/// stage boundaries can be logged with the same key.
#[derive(Debug, Clone)]
pub struct StageTimer {
    correlation_id: CorrelationId,
    stage: &'static str,
    started: std::time::Instant,
}

impl StageTimer {
    pub fn start(correlation_id: &CorrelationId, stage: &'static str) -> Self {
        tracing::debug!(correlation_id = %correlation_id, stage, "stage started");
        Self {
            correlation_id: correlation_id.clone(),
            stage,
            started: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Log the stage end and return the elapsed seconds for histogram recording
    pub fn finish(self) -> f64 {
        let elapsed = self.started.elapsed();
        tracing::debug!(
            correlation_id = %self.correlation_id,
            stage = self.stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );
        elapsed.as_secs_f64()
    }
}
