use std::time::Duration;

use crate::error::RecorderError;

/// Explicit recorder settings, handed to the buffer and transport at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Base URL the message kinds are appended to, e.g.
    /// `http://localhost:8080/api/sessions`.
    pub endpoint_base: String,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            endpoint_base: "http://localhost:8080/api/sessions".to_string(),
            batch_size: 50,
            batch_timeout_ms: 5000,
        }
    }
}

impl RecorderConfig {
    pub fn new(endpoint_base: impl Into<String>) -> Self {
        Self {
            endpoint_base: endpoint_base.into(),
            ..Self::default()
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// `{endpoint_base}/{suffix}` with exactly one slash between them.
    pub fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.endpoint_base.trim_end_matches('/'), suffix)
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.endpoint_base.trim().is_empty() {
            return Err(RecorderError::InvalidConfig("endpoint_base is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(RecorderError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.batch_timeout_ms == 0 {
            return Err(RecorderError::InvalidConfig(
                "batch_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
