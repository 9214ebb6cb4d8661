//! Incremental volume-delta engine.
//!
//! Per instrument, accumulates signed buy/sell volume and a bounded history
//! of per-bar imbalance percentages. History evicts oldest entries only;
//! nothing here resets wholesale, so a single contrary bar never erases the
//! picture the estimator has built up.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use tracing::trace;

use pivot_core::{Aggressor, Bar, InstrumentId, Price, Side, Size};

use crate::config::FlowConfig;

/// Directional flow classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTrend {
    Bullish,
    Neutral,
    Bearish,
}

impl std::fmt::Display for FlowTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Bearish => write!(f, "BEARISH"),
        }
    }
}

/// Snapshot of the flow estimate for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowReading {
    /// Signed cumulative delta since engine start: Σ(buy − sell).
    pub cumulative_delta: Decimal,
    /// Imbalance % of the most recent bar. Positive = net selling.
    pub imbalance_pct: Decimal,
    pub trend: FlowTrend,
}

/// Per-instrument flow state.
#[derive(Debug, Clone, Default)]
struct FlowState {
    cumulative_delta: Decimal,
    buy_volume: Decimal,
    sell_volume: Decimal,
    /// Per-bar imbalance %, oldest first, bounded.
    history: VecDeque<Decimal>,
    /// Last trade price for uptick/downtick inference (precise mode).
    last_trade_price: Option<Price>,
    /// Buy/sell volume accumulated in the bar currently forming.
    bar_buy: Decimal,
    bar_sell: Decimal,
}

/// Windowed order-flow imbalance estimator.
pub struct VolumeDeltaEngine {
    config: FlowConfig,
    states: HashMap<InstrumentId, FlowState>,
}

impl VolumeDeltaEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Ingest one tick (precise mode).
    ///
    /// Signed per-tick volume: the reported aggressor side wins when the
    /// feed provides it; otherwise `+size` on an uptick, `−size` on a
    /// downtick, zero when the price is unchanged or unknown.
    pub fn ingest_tick(
        &mut self,
        instrument: &InstrumentId,
        price: Price,
        size: Size,
        aggressor: Option<Aggressor>,
    ) {
        let state = self.states.entry(instrument.clone()).or_default();

        let signed = match aggressor {
            Some(Aggressor::Buy) => size.inner(),
            Some(Aggressor::Sell) => -size.inner(),
            None => match state.last_trade_price {
                Some(last) if price > last => size.inner(),
                Some(last) if price < last => -size.inner(),
                _ => Decimal::ZERO,
            },
        };
        state.last_trade_price = Some(price);

        if signed.is_sign_positive() && !signed.is_zero() {
            state.bar_buy += signed;
            state.buy_volume += signed;
            state.cumulative_delta += signed;
        } else if signed.is_sign_negative() {
            state.bar_sell += -signed;
            state.sell_volume += -signed;
            state.cumulative_delta += signed;
        }
    }

    /// Seal the forming bar (precise mode): push the accumulated imbalance
    /// into history and reset the per-bar accumulators.
    ///
    /// Call at each bar-close event when feeding ticks.
    pub fn seal_bar(&mut self, instrument: &InstrumentId) {
        let state = self.states.entry(instrument.clone()).or_default();
        let entry = Self::imbalance_pct(state.bar_buy, state.bar_sell);
        state.history.push_back(entry);
        if state.history.len() > self.config.history_cap {
            state.history.pop_front();
        }
        trace!(instrument = %instrument, imbalance_pct = %entry, "Flow bar sealed");
        state.bar_buy = Decimal::ZERO;
        state.bar_sell = Decimal::ZERO;
    }

    /// Ingest one closed bar (approximate mode).
    ///
    /// Splits volume by close location within the range:
    /// `buy = volume × (close − low) / (high − low)`, even split when the
    /// bar has no range. Zero-volume bars record a neutral history entry.
    pub fn ingest_bar(&mut self, bar: &Bar) {
        let state = self.states.entry(bar.instrument.clone()).or_default();

        let volume = bar.volume.inner();
        let range = bar.high.inner() - bar.low.inner();
        let buy = if range.is_zero() {
            volume / Decimal::TWO
        } else {
            volume * (bar.close.inner() - bar.low.inner()) / range
        };
        let sell = volume - buy;

        state.buy_volume += buy;
        state.sell_volume += sell;
        state.cumulative_delta += buy - sell;

        let entry = Self::imbalance_pct(buy, sell);
        state.history.push_back(entry);
        if state.history.len() > self.config.history_cap {
            state.history.pop_front();
        }
        trace!(
            instrument = %bar.instrument,
            imbalance_pct = %entry,
            cumulative_delta = %state.cumulative_delta,
            "Flow bar ingested"
        );
    }

    /// `100 × (sell − buy) / (buy + sell)`; zero on no volume.
    fn imbalance_pct(buy: Decimal, sell: Decimal) -> Decimal {
        let total = buy + sell;
        if total.is_zero() {
            return Decimal::ZERO;
        }
        Decimal::from(100) * (sell - buy) / total
    }

    /// Classify an imbalance reading by the two magnitude thresholds.
    #[must_use]
    pub fn classify(&self, imbalance_pct: Decimal) -> FlowTrend {
        if imbalance_pct >= self.config.bearish_threshold {
            FlowTrend::Bearish
        } else if imbalance_pct <= -self.config.bullish_threshold {
            FlowTrend::Bullish
        } else {
            FlowTrend::Neutral
        }
    }

    /// Current reading for an instrument.
    ///
    /// `None` until at least one bar has been ingested; consumers that need
    /// flow confirmation fail closed on `None`.
    #[must_use]
    pub fn reading(&self, instrument: &InstrumentId) -> Option<FlowReading> {
        let state = self.states.get(instrument)?;
        let imbalance_pct = *state.history.back()?;
        Some(FlowReading {
            cumulative_delta: state.cumulative_delta,
            imbalance_pct,
            trend: self.classify(imbalance_pct),
        })
    }

    /// Sustained-pressure query.
    ///
    /// Scans the bounded history with a sliding window of width
    /// `sustained_window` for **any** contiguous run where every member
    /// clears the sustained threshold in the given direction. A contrary or
    /// neutral reading only invalidates the windows containing it; the
    /// search continues over the rest of history.
    #[must_use]
    pub fn sustained(&self, instrument: &InstrumentId, side: Side) -> bool {
        let Some(state) = self.states.get(instrument) else {
            return false;
        };
        let k = self.config.sustained_window;
        if state.history.len() < k {
            return false;
        }

        let clears = |v: &Decimal| match side {
            // Long wants sustained buying: imbalance ≤ −threshold
            Side::Long => *v <= -self.config.sustained_threshold,
            // Short wants sustained selling: imbalance ≥ threshold
            Side::Short => *v >= self.config.sustained_threshold,
        };

        let mut run = 0usize;
        for v in &state.history {
            if clears(v) {
                run += 1;
                if run >= k {
                    return true;
                }
            } else {
                run = 0;
            }
        }
        false
    }

    /// Session buy/sell volume totals (for conservation checks and audit).
    #[must_use]
    pub fn totals(&self, instrument: &InstrumentId) -> Option<(Decimal, Decimal)> {
        self.states
            .get(instrument)
            .map(|s| (s.buy_volume, s.sell_volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn inst() -> InstrumentId {
        InstrumentId::new("TEST")
    }

    fn bar(high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Bar {
        Bar {
            instrument: inst(),
            open_time: Utc.timestamp_opt(0, 0).unwrap(),
            open: low.into(),
            high: high.into(),
            low: low.into(),
            close: close.into(),
            volume: Size::new(volume),
        }
    }

    #[test]
    fn test_approximate_split() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        // Close at the high: all volume counted as buying
        engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000)));

        let reading = engine.reading(&inst()).unwrap();
        assert_eq!(reading.cumulative_delta, dec!(1000));
        assert_eq!(reading.imbalance_pct, dec!(-100));
        assert_eq!(reading.trend, FlowTrend::Bullish);
    }

    #[test]
    fn test_flat_bar_even_split() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        engine.ingest_bar(&bar(dec!(100), dec!(100), dec!(100), dec!(1000)));

        let reading = engine.reading(&inst()).unwrap();
        assert_eq!(reading.cumulative_delta, dec!(0));
        assert_eq!(reading.imbalance_pct, dec!(0));
        assert_eq!(reading.trend, FlowTrend::Neutral);
    }

    #[test]
    fn test_delta_conservation() {
        // cumulative_delta == Σ(buy − sell) computed independently
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        let bars = [
            (dec!(102), dec!(100), dec!(101.5), dec!(800)),
            (dec!(101), dec!(99), dec!(99.2), dec!(1200)),
            (dec!(100), dec!(100), dec!(100), dec!(400)),
        ];
        let mut expected = dec!(0);
        for (h, l, c, v) in bars {
            let range = h - l;
            let buy = if range.is_zero() { v / dec!(2) } else { v * (c - l) / range };
            expected += buy - (v - buy);
            engine.ingest_bar(&bar(h, l, c, v));
        }
        let reading = engine.reading(&inst()).unwrap();
        assert_eq!(reading.cumulative_delta, expected);

        let (buy, sell) = engine.totals(&inst()).unwrap();
        assert_eq!(reading.cumulative_delta, buy - sell);
    }

    #[test]
    fn test_precise_uptick_downtick() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        let id = inst();

        // First tick: no reference price, contributes zero
        engine.ingest_tick(&id, Price::new(dec!(100)), Size::new(dec!(10)), None);
        // Uptick: +20
        engine.ingest_tick(&id, Price::new(dec!(100.1)), Size::new(dec!(20)), None);
        // Downtick: -5
        engine.ingest_tick(&id, Price::new(dec!(100.05)), Size::new(dec!(5)), None);
        // Unchanged: 0
        engine.ingest_tick(&id, Price::new(dec!(100.05)), Size::new(dec!(7)), None);

        engine.seal_bar(&id);
        let reading = engine.reading(&id).unwrap();
        assert_eq!(reading.cumulative_delta, dec!(15));
        // buy 20, sell 5 -> 100*(5-20)/25 = -60
        assert_eq!(reading.imbalance_pct, dec!(-60));
    }

    #[test]
    fn test_precise_aggressor_overrides() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        let id = inst();

        engine.ingest_tick(&id, Price::new(dec!(100)), Size::new(dec!(10)), Some(Aggressor::Sell));
        // Uptick price move, but reported aggressor is the seller
        engine.ingest_tick(&id, Price::new(dec!(100.2)), Size::new(dec!(10)), Some(Aggressor::Sell));

        engine.seal_bar(&id);
        let reading = engine.reading(&id).unwrap();
        assert_eq!(reading.cumulative_delta, dec!(-20));
        assert_eq!(reading.imbalance_pct, dec!(100));
    }

    #[test]
    fn test_classification_thresholds() {
        let engine = VolumeDeltaEngine::new(FlowConfig::default());
        assert_eq!(engine.classify(dec!(25)), FlowTrend::Bearish);
        assert_eq!(engine.classify(dec!(20)), FlowTrend::Bearish);
        assert_eq!(engine.classify(dec!(19.9)), FlowTrend::Neutral);
        assert_eq!(engine.classify(dec!(-19.9)), FlowTrend::Neutral);
        assert_eq!(engine.classify(dec!(-20)), FlowTrend::Bullish);
        assert_eq!(engine.classify(dec!(-70)), FlowTrend::Bullish);
    }

    #[test]
    fn test_reading_none_when_empty() {
        let engine = VolumeDeltaEngine::new(FlowConfig::default());
        assert!(engine.reading(&inst()).is_none());
    }

    #[test]
    fn test_sustained_run_found() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        // Bullish entries: close at the high -> imbalance -100
        for _ in 0..3 {
            engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000)));
        }
        assert!(engine.sustained(&inst(), Side::Long));
        assert!(!engine.sustained(&inst(), Side::Short));
    }

    #[test]
    fn test_sustained_contrary_reading_does_not_reset_search() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        // Old bearish bar, then a contrary neutral bar, then a full bullish
        // run: the early readings must not prevent finding the later run.
        engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(100), dec!(1000))); // bearish
        engine.ingest_bar(&bar(dec!(100), dec!(100), dec!(100), dec!(1000))); // neutral
        for _ in 0..3 {
            engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000)));
        }
        assert!(engine.sustained(&inst(), Side::Long));
    }

    #[test]
    fn test_sustained_broken_run_not_found() {
        let mut engine = VolumeDeltaEngine::new(FlowConfig::default());
        engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000))); // bullish
        engine.ingest_bar(&bar(dec!(100), dec!(100), dec!(100), dec!(1000))); // neutral breaks run
        engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000))); // bullish
        engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(1000))); // bullish
        // Longest bullish run is 2 < window 3
        assert!(!engine.sustained(&inst(), Side::Long));
    }

    #[test]
    fn test_history_bounded_eviction() {
        let config = FlowConfig {
            history_cap: 5,
            ..Default::default()
        };
        let mut engine = VolumeDeltaEngine::new(config);
        for _ in 0..10 {
            engine.ingest_bar(&bar(dec!(101), dec!(100), dec!(101), dec!(100)));
        }
        let state = engine.states.get(&inst()).unwrap();
        assert_eq!(state.history.len(), 5);
        // Cumulative totals survive eviction
        assert_eq!(state.cumulative_delta, dec!(1000));
    }
}
