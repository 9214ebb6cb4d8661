//! Entry confirmation configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::window::EntryWindow;

/// Configuration for breakout detection, confirmation paths, and the
/// entry filter chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Maximum breakout attempts per (instrument, direction) per session.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Time-of-day window during which new attempts may start.
    #[serde(default)]
    pub entry_window: EntryWindow,

    /// Volume ratio (candle volume / baseline average) at or above which a
    /// breakout candle is classified strong.
    #[serde(default = "default_volume_ratio_min")]
    pub volume_ratio_min: Decimal,
    /// Candle body % at or above which a breakout candle is classified strong.
    #[serde(default = "default_candle_pct_min")]
    pub candle_pct_min: Decimal,
    /// Closed bars in the volume baseline average (excluding the candle
    /// under classification).
    #[serde(default = "default_volume_lookback")]
    pub volume_lookback: usize,

    /// Maximum age of a weak-tracking attempt before it expires, seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
    /// Volume ratio required on the re-cross candle of a pullback retest.
    #[serde(default = "default_rebreak_ratio_min")]
    pub rebreak_ratio_min: Decimal,
    /// Tolerance % beyond the pivot that a sustained break may recede
    /// without disqualifying.
    #[serde(default = "default_sustain_tolerance_pct")]
    pub sustain_tolerance_pct: Decimal,
    /// Minimum time beyond the pivot for a sustained break, seconds.
    #[serde(default = "default_sustain_min_secs")]
    pub sustain_min_secs: i64,

    /// Recent range must exceed `chop_ratio × ATR` or the market is choppy.
    #[serde(default = "default_chop_ratio")]
    pub chop_ratio: Decimal,
    /// Bars in the choppiness recent-range window.
    #[serde(default = "default_chop_range_bars")]
    pub chop_range_bars: usize,
    /// Bars in the ATR window.
    #[serde(default = "default_atr_bars")]
    pub atr_bars: usize,
    /// Minimum % distance from entry to target.
    #[serde(default = "default_min_room_pct")]
    pub min_room_pct: Decimal,
    /// Oscillator band for long entries.
    #[serde(default = "default_osc_long_min")]
    pub osc_long_min: Decimal,
    #[serde(default = "default_osc_long_max")]
    pub osc_long_max: Decimal,
    /// Oscillator band for short entries.
    #[serde(default = "default_osc_short_min")]
    pub osc_short_min: Decimal,
    #[serde(default = "default_osc_short_max")]
    pub osc_short_max: Decimal,

    /// Per-filter enable flags. A disabled filter records "skipped" in the
    /// trace and never blocks.
    #[serde(default = "default_true")]
    pub enable_choppiness: bool,
    #[serde(default = "default_true")]
    pub enable_room_to_target: bool,
    #[serde(default = "default_true")]
    pub enable_oscillator: bool,
    #[serde(default = "default_true")]
    pub enable_directional_volume: bool,
    #[serde(default = "default_true")]
    pub enable_order_flow: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_volume_ratio_min() -> Decimal {
    Decimal::new(18, 1) // 1.8
}

fn default_candle_pct_min() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_volume_lookback() -> usize {
    20
}

fn default_max_age_secs() -> i64 {
    900
}

fn default_rebreak_ratio_min() -> Decimal {
    Decimal::new(18, 1) // 1.8
}

fn default_sustain_tolerance_pct() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_sustain_min_secs() -> i64 {
    300
}

fn default_chop_ratio() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_chop_range_bars() -> usize {
    5
}

fn default_atr_bars() -> usize {
    14
}

fn default_min_room_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_osc_long_min() -> Decimal {
    Decimal::from(40)
}

fn default_osc_long_max() -> Decimal {
    Decimal::from(75)
}

fn default_osc_short_min() -> Decimal {
    Decimal::from(25)
}

fn default_osc_short_max() -> Decimal {
    Decimal::from(60)
}

fn default_true() -> bool {
    true
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            entry_window: EntryWindow::default(),
            volume_ratio_min: default_volume_ratio_min(),
            candle_pct_min: default_candle_pct_min(),
            volume_lookback: default_volume_lookback(),
            max_age_secs: default_max_age_secs(),
            rebreak_ratio_min: default_rebreak_ratio_min(),
            sustain_tolerance_pct: default_sustain_tolerance_pct(),
            sustain_min_secs: default_sustain_min_secs(),
            chop_ratio: default_chop_ratio(),
            chop_range_bars: default_chop_range_bars(),
            atr_bars: default_atr_bars(),
            min_room_pct: default_min_room_pct(),
            osc_long_min: default_osc_long_min(),
            osc_long_max: default_osc_long_max(),
            osc_short_min: default_osc_short_min(),
            osc_short_max: default_osc_short_max(),
            enable_choppiness: true,
            enable_room_to_target: true,
            enable_oscillator: true,
            enable_directional_volume: true,
            enable_order_flow: true,
        }
    }
}

impl EntryConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be non-zero".to_string());
        }
        self.entry_window.validate()?;
        if self.volume_ratio_min <= Decimal::ONE {
            return Err(format!(
                "volume_ratio_min ({}) must exceed 1",
                self.volume_ratio_min
            ));
        }
        if self.candle_pct_min.is_sign_negative() {
            return Err("candle_pct_min must be non-negative".to_string());
        }
        if self.volume_lookback == 0 {
            return Err("volume_lookback must be non-zero".to_string());
        }
        if self.max_age_secs <= 0 {
            return Err("max_age_secs must be positive".to_string());
        }
        if self.sustain_min_secs <= 0 {
            return Err("sustain_min_secs must be positive".to_string());
        }
        if self.sustain_min_secs >= self.max_age_secs {
            return Err(format!(
                "sustain_min_secs ({}) must be below max_age_secs ({})",
                self.sustain_min_secs, self.max_age_secs
            ));
        }
        if self.sustain_tolerance_pct.is_sign_negative() {
            return Err("sustain_tolerance_pct must be non-negative".to_string());
        }
        if self.chop_range_bars == 0 || self.atr_bars == 0 {
            return Err("choppiness windows must be non-zero".to_string());
        }
        if self.min_room_pct.is_sign_negative() {
            return Err("min_room_pct must be non-negative".to_string());
        }
        if self.osc_long_min >= self.osc_long_max || self.osc_short_min >= self.osc_short_max {
            return Err("oscillator bands must have min < max".to_string());
        }
        Ok(())
    }
}
