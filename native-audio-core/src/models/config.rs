use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Tunables shared by every engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Bounded wait on the buffer-ready signal before re-checking the
    /// running flag (default: 2000).
    pub wait_timeout_ms: u64,

    /// Stream buffer length requested from the backend (default: 1000).
    pub buffer_duration_ms: u64,

    /// Chunks the callback bridge holds before the producer waits
    /// (default: 64).
    pub delivery_queue_capacity: usize,

    /// Longest the capture thread waits for a free bridge slot before
    /// dropping a chunk (default: 250).
    pub delivery_timeout_ms: u64,

    /// Run the permission gate for the requested direction in `start`
    /// (default: true).
    pub check_permission_on_start: bool,
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(1..=10_000).contains(&self.wait_timeout_ms) {
            return Err(CaptureError::InvalidConfig(format!(
                "wait timeout out of range: {}ms",
                self.wait_timeout_ms
            )));
        }
        if !(10..=5_000).contains(&self.buffer_duration_ms) {
            return Err(CaptureError::InvalidConfig(format!(
                "buffer duration out of range: {}ms",
                self.buffer_duration_ms
            )));
        }
        if !(1..=4_096).contains(&self.delivery_queue_capacity) {
            return Err(CaptureError::InvalidConfig(format!(
                "delivery queue capacity out of range: {}",
                self.delivery_queue_capacity
            )));
        }
        if self.delivery_timeout_ms > 10_000 {
            return Err(CaptureError::InvalidConfig(format!(
                "delivery timeout out of range: {}ms",
                self.delivery_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_duration_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 2_000,
            buffer_duration_ms: 1_000,
            delivery_queue_capacity: 64,
            delivery_timeout_ms: 250,
            check_permission_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wait_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{"waitTimeoutMs": 50}"#).unwrap();
        assert_eq!(config.wait_timeout_ms, 50);
        assert_eq!(config.delivery_queue_capacity, 64);
        assert!(config.check_permission_on_start);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = EngineConfig {
            delivery_queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));

        let err = EngineConfig::from_json(r#"{"waitTimeoutMs": 0}"#).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }
}
