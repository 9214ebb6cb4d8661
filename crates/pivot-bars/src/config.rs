//! Bar aggregation configuration.

use serde::{Deserialize, Serialize};

/// Configuration for bar aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsConfig {
    /// Bar duration in seconds.
    #[serde(default = "default_bar_secs")]
    pub bar_secs: i64,
    /// Maximum number of closed bars retained per instrument.
    /// Oldest bars are evicted beyond this capacity.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_bar_secs() -> i64 {
    60
}

fn default_history_cap() -> usize {
    500
}

impl Default for BarsConfig {
    fn default() -> Self {
        Self {
            bar_secs: default_bar_secs(),
            history_cap: default_history_cap(),
        }
    }
}

impl BarsConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bar_secs <= 0 {
            return Err(format!("bar_secs ({}) must be positive", self.bar_secs));
        }
        if self.history_cap == 0 {
            return Err("history_cap must be non-zero".to_string());
        }
        Ok(())
    }
}
