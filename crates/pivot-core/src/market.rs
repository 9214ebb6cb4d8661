//! Market data and level inputs.
//!
//! Contains the transient `Tick`, the aggregated `Bar`, and the externally
//! supplied `LevelPlan` (pivot/target levels with permitted sides).

use crate::{InstrumentId, Price, Side, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggressor side of a trade print, when the feed reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressor {
    Buy,
    Sell,
}

/// A single trade event. Transient: consumed by the bar aggregator and the
/// flow engine, never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub price: Price,
    pub size: Size,
    /// Aggressor side if the feed provides it; absent on most equity feeds.
    pub aggressor: Option<Aggressor>,
}

impl Tick {
    pub fn new(instrument: InstrumentId, timestamp: DateTime<Utc>, price: Price, size: Size) -> Self {
        Self {
            instrument,
            timestamp,
            price,
            size,
            aggressor: None,
        }
    }
}

/// Fixed-duration OHLCV bar. Immutable once sealed by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument: InstrumentId,
    /// Bar open time, floored to the bar-duration boundary.
    pub open_time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    /// Latest cumulative volume reading observed inside the bar window.
    pub volume: Size,
}

impl Bar {
    /// High-low range of the bar.
    pub fn range(&self) -> Decimal {
        self.high.inner() - self.low.inner()
    }

    /// Candle body as a percentage of the open: `|close - open| / open * 100`.
    ///
    /// Returns zero for a zero open (degenerate feed data).
    pub fn body_pct(&self) -> Decimal {
        if self.open.is_zero() {
            return Decimal::ZERO;
        }
        ((self.close.inner() - self.open.inner()) / self.open.inner() * Decimal::from(100)).abs()
    }

    /// Whether the candle closed above its open.
    pub fn is_up(&self) -> bool {
        self.close > self.open
    }

    /// Whether the candle direction agrees with a trade direction.
    pub fn agrees_with(&self, side: Side) -> bool {
        match side {
            Side::Long => self.close > self.open,
            Side::Short => self.close < self.open,
        }
    }

    /// True range against the previous close:
    /// `max(high - low, |high - prev_close|, |low - prev_close|)`.
    pub fn true_range(&self, prev_close: Price) -> Decimal {
        let hl = self.high.inner() - self.low.inner();
        let hc = (self.high.inner() - prev_close.inner()).abs();
        let lc = (self.low.inner() - prev_close.inner()).abs();
        hl.max(hc).max(lc)
    }
}

/// Externally supplied trade plan for one instrument: the pivot level whose
/// breach triggers entry evaluation, the profit target, and the directions
/// the instrument may be traded in.
///
/// Read-only input; level discovery is owned by an upstream collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelPlan {
    pub instrument: InstrumentId,
    /// Pre-identified resistance (long) / support (short) level.
    pub pivot: Price,
    /// Profit target for the position.
    pub target: Price,
    /// Directions this plan permits.
    pub allowed_sides: Vec<Side>,
}

impl LevelPlan {
    pub fn new(instrument: InstrumentId, pivot: Price, target: Price, allowed_sides: Vec<Side>) -> Self {
        Self {
            instrument,
            pivot,
            target,
            allowed_sides,
        }
    }

    /// Whether the plan permits trading in the given direction.
    pub fn permits(&self, side: Side) -> bool {
        self.allowed_sides.contains(&side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            instrument: InstrumentId::new("TEST"),
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            open: Price::new(open),
            high: Price::new(high),
            low: Price::new(low),
            close: Price::new(close),
            volume: Size::new(dec!(1000)),
        }
    }

    #[test]
    fn test_body_pct() {
        let b = bar(dec!(100), dec!(101), dec!(99.5), dec!(100.9));
        assert_eq!(b.body_pct(), dec!(0.9));
    }

    #[test]
    fn test_body_pct_down_candle_is_positive() {
        let b = bar(dec!(100), dec!(100.2), dec!(98.9), dec!(99));
        assert_eq!(b.body_pct(), dec!(1));
    }

    #[test]
    fn test_agrees_with() {
        let up = bar(dec!(100), dec!(101), dec!(99.9), dec!(100.8));
        assert!(up.agrees_with(Side::Long));
        assert!(!up.agrees_with(Side::Short));

        let down = bar(dec!(100), dec!(100.1), dec!(99), dec!(99.2));
        assert!(down.agrees_with(Side::Short));
        assert!(!down.agrees_with(Side::Long));
    }

    #[test]
    fn test_true_range_gap() {
        // Gap up: previous close well below the bar's low
        let b = bar(dec!(102), dec!(103), dec!(101.5), dec!(102.5));
        let tr = b.true_range(Price::new(dec!(100)));
        // high - prev_close = 3 dominates high - low = 1.5
        assert_eq!(tr, dec!(3));
    }

    #[test]
    fn test_level_plan_permits() {
        let plan = LevelPlan::new(
            InstrumentId::new("TEST"),
            Price::new(dec!(100)),
            Price::new(dec!(102)),
            vec![Side::Long],
        );
        assert!(plan.permits(Side::Long));
        assert!(!plan.permits(Side::Short));
    }
}
