//! Position lifecycle configuration.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for the position lifecycle rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Per-share favorable move (price units) that takes the first partial.
    #[serde(default = "default_first_partial_gain")]
    pub first_partial_gain: Decimal,
    /// Fraction of the whole position closed by the first partial.
    #[serde(default = "default_first_partial_fraction")]
    pub first_partial_fraction: Decimal,
    /// Fraction of the *remainder* closed by the second partial at target.
    #[serde(default = "default_second_partial_fraction")]
    pub second_partial_fraction: Decimal,

    /// Trailing stop distance % below (long) / above (short) the favorable
    /// extreme.
    #[serde(default = "default_trailing_pct")]
    pub trailing_pct: Decimal,
    /// Tightened trailing distance % applied after a post-target stall.
    #[serde(default = "default_stall_trailing_pct")]
    pub stall_trailing_pct: Decimal,
    /// Price range % within which the post-target consolidation counts as
    /// a stall.
    #[serde(default = "default_stall_range_pct")]
    pub stall_range_pct: Decimal,
    /// Minimum stall duration in seconds before the stop tightens.
    #[serde(default = "default_stall_min_secs")]
    pub stall_min_secs: i64,

    /// Holding time in seconds after which the no-progress exit applies.
    #[serde(default = "default_time_rule_after_secs")]
    pub time_rule_after_secs: i64,
    /// Per-share favorable move below which the no-progress exit fires.
    #[serde(default = "default_time_rule_min_gain")]
    pub time_rule_min_gain: Decimal,

    /// Time of day (HH:MM UTC) at which all positions are flattened.
    #[serde(default = "default_session_end")]
    pub session_end: String,
}

fn default_first_partial_gain() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_first_partial_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_second_partial_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_trailing_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_stall_trailing_pct() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_stall_range_pct() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_stall_min_secs() -> i64 {
    300
}

fn default_time_rule_after_secs() -> i64 {
    480
}

fn default_time_rule_min_gain() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_session_end() -> String {
    "20:55".to_string()
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            first_partial_gain: default_first_partial_gain(),
            first_partial_fraction: default_first_partial_fraction(),
            second_partial_fraction: default_second_partial_fraction(),
            trailing_pct: default_trailing_pct(),
            stall_trailing_pct: default_stall_trailing_pct(),
            stall_range_pct: default_stall_range_pct(),
            stall_min_secs: default_stall_min_secs(),
            time_rule_after_secs: default_time_rule_after_secs(),
            time_rule_min_gain: default_time_rule_min_gain(),
            session_end: default_session_end(),
        }
    }
}

impl PositionConfig {
    /// Parse the session end as NaiveTime.
    pub fn session_end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.session_end, "%H:%M").ok()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !unit(self.first_partial_fraction) {
            return Err("first_partial_fraction must be in (0, 1)".to_string());
        }
        if !unit(self.second_partial_fraction) {
            return Err("second_partial_fraction must be in (0, 1)".to_string());
        }
        if self.first_partial_gain <= Decimal::ZERO {
            return Err("first_partial_gain must be positive".to_string());
        }
        if self.trailing_pct <= Decimal::ZERO || self.stall_trailing_pct <= Decimal::ZERO {
            return Err("trailing distances must be positive".to_string());
        }
        if self.stall_trailing_pct >= self.trailing_pct {
            return Err(format!(
                "stall_trailing_pct ({}) must be tighter than trailing_pct ({})",
                self.stall_trailing_pct, self.trailing_pct
            ));
        }
        if self.stall_range_pct <= Decimal::ZERO {
            return Err("stall_range_pct must be positive".to_string());
        }
        if self.stall_min_secs <= 0 || self.time_rule_after_secs <= 0 {
            return Err("durations must be positive".to_string());
        }
        if self.time_rule_min_gain.is_sign_negative() {
            return Err("time_rule_min_gain must be non-negative".to_string());
        }
        if self.session_end_time().is_none() {
            return Err(format!(
                "invalid session_end '{}', expected HH:MM",
                self.session_end
            ));
        }
        Ok(())
    }
}
