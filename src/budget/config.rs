//! Token budget configuration.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Default prompt ceiling in tokens.
pub const DEFAULT_CEILING: usize = 3072;

/// What a session does with its history when a prompt is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Leave the history as it is and let the user decide to clear it
    #[default]
    Keep,
    /// Clear the history back to the greeting straight away
    Reset,
}

/// Configuration for prompt budget enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Prompts measuring this many tokens or more are rejected
    pub ceiling: usize,

    /// Usage fraction (0.0 - 1.0) at which an admitted prompt is reported as `Warning`
    pub warning_threshold: f64,

    /// Usage fraction (0.0 - 1.0) at which an admitted prompt is reported as `Critical`
    pub critical_threshold: f64,

    /// History handling after a rejected prompt
    pub overflow_policy: OverflowPolicy,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            overflow_policy: OverflowPolicy::Keep,
        }
    }
}

impl BudgetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token ceiling.
    pub fn with_ceiling(mut self, tokens: usize) -> Self {
        self.ceiling = tokens;
        self
    }

    /// Set the warning threshold.
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the critical threshold.
    pub fn with_critical_threshold(mut self, threshold: f64) -> Self {
        self.critical_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Check that the ceiling and thresholds are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ceiling == 0 {
            return Err(ConfigError::Invalid {
                field: "budget.ceiling",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("budget.warning_threshold", self.warning_threshold),
            ("budget.critical_threshold", self.critical_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is outside 0.0..=1.0"),
                });
            }
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(ConfigError::Invalid {
                field: "budget.warning_threshold",
                reason: "must not exceed budget.critical_threshold".to_string(),
            });
        }
        Ok(())
    }
}
