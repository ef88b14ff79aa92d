//! Task-level configuration for the generate-test-repair loop.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Result, SpinneretError};

/// Configuration consumed by the repair loop and task facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum candidates tested per task (iteration budget).
    pub max_iterations: u32,

    /// Wall-clock budget for each test run, in seconds. Release runs are
    /// unbounded.
    pub test_timeout_secs: u64,

    /// Field-completeness threshold for `success` classification
    /// (fraction of requested fields that must be populated).
    pub threshold: f32,

    /// Root directory under which per-target project directories are created.
    pub output_root: PathBuf,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            test_timeout_secs: 120,
            threshold: 1.0,
            output_root: PathBuf::from("output"),
        }
    }
}

impl TaskConfig {
    /// Per-run timeout as a [`Duration`].
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Validate bounds before a task starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SpinneretError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) || self.threshold == 0.0 {
            return Err(SpinneretError::InvalidConfig(format!(
                "threshold must be in (0.0, 1.0], got {}",
                self.threshold
            )));
        }
        if self.test_timeout_secs == 0 {
            return Err(SpinneretError::InvalidConfig(
                "test_timeout_secs must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TaskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.test_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = TaskConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        for bad in [0.0f32, -0.5, 1.5] {
            let config = TaskConfig {
                threshold: bad,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {bad} should fail");
        }
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = TaskConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TaskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
