//! Configuration for batch runs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wall-clock budget for one invocation
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(480);

/// Default pause between two items
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(1000);

/// Configuration for a [`BatchRunner`](crate::BatchRunner)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// How long an invocation may keep starting new items
    pub time_budget: Duration,

    /// Fixed pause applied after every item, success or failure
    pub item_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { time_budget: DEFAULT_TIME_BUDGET, item_delay: DEFAULT_ITEM_DELAY }
    }
}

impl BatchConfig {
    /// Create a configuration with a custom budget and the default delay
    pub fn with_budget(time_budget: Duration) -> Self {
        Self { time_budget, ..Default::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.time_budget.is_zero() {
            return Err("time_budget must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatchConfig::default();
        assert_eq!(config.time_budget, Duration::from_secs(480));
        assert_eq!(config.item_delay, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = BatchConfig::with_budget(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
