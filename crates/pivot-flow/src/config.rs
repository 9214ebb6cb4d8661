//! Flow engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for volume-delta estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Imbalance % at or above which flow is classified BEARISH.
    /// Positive imbalance means net selling.
    #[serde(default = "default_bearish_threshold")]
    pub bearish_threshold: Decimal,
    /// Imbalance % magnitude at or above which flow is classified BULLISH
    /// (applied to negative imbalance readings).
    #[serde(default = "default_bullish_threshold")]
    pub bullish_threshold: Decimal,
    /// Lower per-bar threshold used by the sustained-pressure query.
    #[serde(default = "default_sustained_threshold")]
    pub sustained_threshold: Decimal,
    /// Width of the sustained-pressure sliding window in bars.
    #[serde(default = "default_sustained_window")]
    pub sustained_window: usize,
    /// Maximum per-bar imbalance entries retained per instrument.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_bearish_threshold() -> Decimal {
    Decimal::from(20)
}

fn default_bullish_threshold() -> Decimal {
    Decimal::from(20)
}

fn default_sustained_threshold() -> Decimal {
    Decimal::from(10)
}

fn default_sustained_window() -> usize {
    3
}

fn default_history_cap() -> usize {
    120
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            bearish_threshold: default_bearish_threshold(),
            bullish_threshold: default_bullish_threshold(),
            sustained_threshold: default_sustained_threshold(),
            sustained_window: default_sustained_window(),
            history_cap: default_history_cap(),
        }
    }
}

impl FlowConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bearish_threshold.is_sign_negative() || self.bullish_threshold.is_sign_negative() {
            return Err("imbalance thresholds must be non-negative".to_string());
        }
        if self.sustained_threshold > self.bearish_threshold
            || self.sustained_threshold > self.bullish_threshold
        {
            return Err(format!(
                "sustained_threshold ({}) must not exceed the aggressive thresholds",
                self.sustained_threshold
            ));
        }
        if self.sustained_window == 0 {
            return Err("sustained_window must be non-zero".to_string());
        }
        if self.history_cap < self.sustained_window {
            return Err(format!(
                "history_cap ({}) must be at least sustained_window ({})",
                self.history_cap, self.sustained_window
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_valid() {
        assert!(FlowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sustained_must_be_lower() {
        let config = FlowConfig {
            sustained_threshold: dec!(30),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = FlowConfig {
            sustained_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
