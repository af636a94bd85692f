//! KernelConfig - カーネル全体の設定値
//!
//! すべてのフィールドに既定値があり、JSON ファイルでは上書きしたい項目だけを書けば十分です。
//! Duration はミリ秒の整数で表します。
//!
//! ```json
//! { "max_total_steps": 80, "heartbeat": 250 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::KernelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Circuit-breaker threshold.
    pub max_consecutive_failures: u32,
    /// Attempts of the retry loop per task execution.
    pub max_attempts_per_task: u32,
    /// Global ceiling on finished task executions per mission.
    pub max_total_steps: u32,

    #[serde(with = "crate::domain::duration_ms")]
    pub default_lease_timeout: Duration,
    pub queue_capacity: usize,
    pub history_capacity: usize,
    pub action_history_window: usize,

    #[serde(with = "crate::domain::duration_ms")]
    pub heartbeat: Duration,
    #[serde(with = "crate::domain::duration_ms")]
    pub idle_backoff: Duration,

    #[serde(with = "crate::domain::duration_ms")]
    pub verify_timeout: Duration,
    #[serde(with = "crate::domain::duration_ms")]
    pub verify_interval: Duration,

    #[serde(with = "crate::domain::duration_ms")]
    pub scroll_settle: Duration,
    #[serde(with = "crate::domain::duration_ms")]
    pub wait_delay: Duration,
    #[serde(with = "crate::domain::duration_ms")]
    pub back_settle: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 20,
            max_attempts_per_task: 5,
            max_total_steps: 50,
            default_lease_timeout: Duration::from_secs(30),
            queue_capacity: 64,
            history_capacity: 500,
            action_history_window: 100,
            heartbeat: Duration::from_millis(500),
            idle_backoff: Duration::from_millis(100),
            verify_timeout: Duration::from_secs(3),
            verify_interval: Duration::from_millis(500),
            scroll_settle: Duration::from_secs(1),
            wait_delay: Duration::from_secs(3),
            back_settle: Duration::from_millis(1500),
        }
    }
}

impl KernelConfig {
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| KernelError::Config(format!("json decode: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, KernelError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        let positive_counts = [
            ("max_consecutive_failures", self.max_consecutive_failures as usize),
            ("max_attempts_per_task", self.max_attempts_per_task as usize),
            ("max_total_steps", self.max_total_steps as usize),
            ("queue_capacity", self.queue_capacity),
            ("history_capacity", self.history_capacity),
            ("action_history_window", self.action_history_window),
        ];
        for (name, value) in positive_counts {
            if value == 0 {
                return Err(KernelError::Config(format!("{name} must be at least 1")));
            }
        }

        let positive_durations = [
            ("default_lease_timeout", self.default_lease_timeout),
            ("heartbeat", self.heartbeat),
            ("idle_backoff", self.idle_backoff),
            ("verify_interval", self.verify_interval),
        ];
        for (name, value) in positive_durations {
            if value.is_zero() {
                return Err(KernelError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_total_steps, 50);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.heartbeat, Duration::from_millis(500));
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = KernelConfig::from_json(r#"{ "max_total_steps": 80, "heartbeat": 250 }"#).unwrap();
        assert_eq!(config.max_total_steps, 80);
        assert_eq!(config.heartbeat, Duration::from_millis(250));
        assert_eq!(config.max_attempts_per_task, 5);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = KernelConfig::from_json(r#"{ "queue_capacity": 0 }"#).unwrap_err();
        assert_eq!(err, KernelError::Config("queue_capacity must be at least 1".into()));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = KernelConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, KernelError::Config(msg) if msg.starts_with("json decode")));
    }
}
