//! Entry filter chain.
//!
//! Every confirmation path must clear the same ordered chain before an
//! entry signal is emitted. Filters are cheap-first: market-state checks
//! run before the order-flow check, which is the most data-hungry and
//! evaluated last.
//!
//! Missing-data policy per filter:
//! - choppiness: fails open (insufficient bar history passes)
//! - room_to_target: fails closed (no target blocks)
//! - oscillator: fails open (no oscillator value passes)
//! - directional_volume: always computable from the candle
//! - order_flow: fails closed (no flow reading blocks)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pivot_bars::BarSeries;
use pivot_core::{Bar, Price, Side};
use pivot_flow::{FlowTrend, VolumeDeltaEngine};

use crate::config::EntryConfig;

/// Result of a single filter check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterVerdict {
    Pass,
    /// Filter disabled by configuration.
    Skipped,
    Block(String),
}

/// One entry in the audit trace of a chain run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCheck {
    pub name: String,
    pub verdict: FilterVerdict,
}

/// Ordered record of every filter consulted during one chain run.
///
/// On a block the trace ends at the blocking filter; later filters were
/// never evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTrace {
    pub checks: Vec<FilterCheck>,
}

impl FilterTrace {
    /// Reason of the blocking filter, if the chain blocked.
    #[must_use]
    pub fn block_reason(&self) -> Option<&str> {
        self.checks.iter().find_map(|c| match &c.verdict {
            FilterVerdict::Block(reason) => Some(reason.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.block_reason().is_none()
    }
}

/// Inputs for one filter chain run, borrowed from the decision engine.
pub struct FilterContext<'a> {
    pub side: Side,
    pub pivot: Price,
    pub target: Price,
    /// The confirming candle under evaluation.
    pub candle: &'a Bar,
    pub series: &'a BarSeries,
    pub flow: &'a VolumeDeltaEngine,
    /// Momentum oscillator value, when a feed supplies one.
    pub oscillator: Option<Decimal>,
}

/// The ordered entry filter chain.
#[derive(Debug, Clone)]
pub struct FilterChain {
    config: EntryConfig,
}

impl FilterChain {
    pub fn new(config: EntryConfig) -> Self {
        Self { config }
    }

    /// Run the full chain, short-circuiting on the first block.
    ///
    /// Returns the trace of every filter consulted; the caller inspects
    /// `trace.passed()` for the overall verdict.
    pub fn run(&self, ctx: &FilterContext<'_>) -> FilterTrace {
        let mut trace = FilterTrace::default();

        if Self::record(&mut trace, ctx, "choppiness", self.check_choppiness(ctx)) {
            return trace;
        }
        if Self::record(&mut trace, ctx, "room_to_target", self.check_room_to_target(ctx)) {
            return trace;
        }
        if Self::record(&mut trace, ctx, "oscillator", self.check_oscillator(ctx)) {
            return trace;
        }
        if Self::record(
            &mut trace,
            ctx,
            "directional_volume",
            self.check_directional_volume(ctx),
        ) {
            return trace;
        }
        Self::record(&mut trace, ctx, "order_flow", self.check_order_flow(ctx));

        trace
    }

    /// Append one check to the trace. Returns true when it blocked.
    fn record(
        trace: &mut FilterTrace,
        ctx: &FilterContext<'_>,
        name: &str,
        verdict: FilterVerdict,
    ) -> bool {
        let blocked = matches!(&verdict, FilterVerdict::Block(_));
        if let FilterVerdict::Block(reason) = &verdict {
            debug!(
                instrument = %ctx.candle.instrument,
                side = %ctx.side,
                filter = name,
                reason,
                "Entry filter blocked"
            );
        }
        trace.checks.push(FilterCheck {
            name: name.to_string(),
            verdict,
        });
        blocked
    }

    /// Recent range must exceed `chop_ratio × ATR`, otherwise the market
    /// is too compressed for a breakout to travel. Fails open when the
    /// bar history is too short for either statistic.
    fn check_choppiness(&self, ctx: &FilterContext<'_>) -> FilterVerdict {
        if !self.config.enable_choppiness {
            return FilterVerdict::Skipped;
        }
        let range = ctx.series.recent_range(self.config.chop_range_bars);
        let atr = ctx.series.atr(self.config.atr_bars);
        match (range, atr) {
            (Some(range), Some(atr)) => {
                let floor = self.config.chop_ratio * atr;
                if range > floor {
                    FilterVerdict::Pass
                } else {
                    FilterVerdict::Block(format!(
                        "choppy market: {}-bar range {} <= {} x ATR ({})",
                        self.config.chop_range_bars, range, self.config.chop_ratio, atr
                    ))
                }
            }
            _ => FilterVerdict::Pass,
        }
    }

    /// Distance from the candle close to the target must leave room worth
    /// entering for. Applies on every confirmation path; a momentum candle
    /// can close most of the way to the target by itself. Fails closed on
    /// a missing or degenerate target.
    fn check_room_to_target(&self, ctx: &FilterContext<'_>) -> FilterVerdict {
        if !self.config.enable_room_to_target {
            return FilterVerdict::Skipped;
        }
        if ctx.target.is_zero() {
            return FilterVerdict::Block("no target level".to_string());
        }
        let Some(pct) = ctx.target.pct_from(ctx.candle.close) else {
            return FilterVerdict::Block("degenerate close price".to_string());
        };
        let room = match ctx.side {
            Side::Long => pct,
            Side::Short => -pct,
        };
        if room >= self.config.min_room_pct {
            FilterVerdict::Pass
        } else {
            FilterVerdict::Block(format!(
                "room to target {:.2}% below minimum {}%",
                room, self.config.min_room_pct
            ))
        }
    }

    /// Oscillator must sit inside the directional band: enough momentum
    /// to carry, not so much that the move is spent. Fails open when no
    /// oscillator value is available.
    fn check_oscillator(&self, ctx: &FilterContext<'_>) -> FilterVerdict {
        if !self.config.enable_oscillator {
            return FilterVerdict::Skipped;
        }
        let Some(value) = ctx.oscillator else {
            return FilterVerdict::Pass;
        };
        let (min, max) = match ctx.side {
            Side::Long => (self.config.osc_long_min, self.config.osc_long_max),
            Side::Short => (self.config.osc_short_min, self.config.osc_short_max),
        };
        if value >= min && value <= max {
            FilterVerdict::Pass
        } else {
            FilterVerdict::Block(format!(
                "oscillator {} outside {} band [{}, {}]",
                value, ctx.side, min, max
            ))
        }
    }

    /// The confirming candle must close in the trade direction.
    fn check_directional_volume(&self, ctx: &FilterContext<'_>) -> FilterVerdict {
        if !self.config.enable_directional_volume {
            return FilterVerdict::Skipped;
        }
        if ctx.candle.agrees_with(ctx.side) {
            FilterVerdict::Pass
        } else {
            FilterVerdict::Block(format!(
                "candle direction disagrees with {} entry",
                ctx.side
            ))
        }
    }

    /// Order flow must agree: the trend classification matches the trade
    /// direction, or sustained directional pressure is present. Fails
    /// closed when the flow engine has no reading yet.
    fn check_order_flow(&self, ctx: &FilterContext<'_>) -> FilterVerdict {
        if !self.config.enable_order_flow {
            return FilterVerdict::Skipped;
        }
        let Some(reading) = ctx.flow.reading(&ctx.candle.instrument) else {
            return FilterVerdict::Block("no order-flow reading".to_string());
        };
        let agrees = match ctx.side {
            Side::Long => reading.trend == FlowTrend::Bullish,
            Side::Short => reading.trend == FlowTrend::Bearish,
        };
        if agrees || ctx.flow.sustained(&ctx.candle.instrument, ctx.side) {
            FilterVerdict::Pass
        } else {
            FilterVerdict::Block(format!(
                "order flow {} (imbalance {:.1}%) does not support {} entry",
                reading.trend, reading.imbalance_pct, ctx.side
            ))
        }
    }
}
