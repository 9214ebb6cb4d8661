//! Application configuration.

use crate::error::{AppError, AppResult};
use pivot_bars::BarsConfig;
use pivot_core::{InstrumentId, LevelPlan, Price, Side};
use pivot_entry::EntryConfig;
use pivot_flow::FlowConfig;
use pivot_position::PositionConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One traded level: the instrument, its pivot and target, and the
/// directions it may be traded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Ticker symbol (normalized to uppercase).
    pub symbol: String,
    /// Pivot level whose breach starts entry evaluation.
    pub pivot: Decimal,
    /// Profit target for positions opened off this level.
    pub target: Decimal,
    /// Permitted directions. Default: long only.
    #[serde(default = "default_sides")]
    pub sides: Vec<Side>,
}

fn default_sides() -> Vec<Side> {
    vec![Side::Long]
}

impl LevelConfig {
    /// Convert to the domain-level plan.
    #[must_use]
    pub fn to_plan(&self) -> LevelPlan {
        LevelPlan::new(
            InstrumentId::new(&self.symbol),
            Price::new(self.pivot),
            Price::new(self.target),
            self.sides.clone(),
        )
    }

    fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("level symbol must be non-empty".to_string());
        }
        if self.pivot <= Decimal::ZERO {
            return Err(format!("pivot ({}) must be positive", self.pivot));
        }
        if self.target <= Decimal::ZERO {
            return Err(format!("target ({}) must be positive", self.target));
        }
        if self.sides.is_empty() {
            return Err(format!("level {} permits no sides", self.symbol));
        }
        for side in &self.sides {
            let above = self.target > self.pivot;
            let wants_above = *side == Side::Long;
            if above != wants_above {
                return Err(format!(
                    "level {}: target ({}) is on the wrong side of pivot ({}) for {side}",
                    self.symbol, self.target, self.pivot
                ));
            }
        }
        Ok(())
    }
}

/// Engine configuration: sizing and snapshot cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shares per new position.
    #[serde(default = "default_shares_per_trade")]
    pub shares_per_trade: Decimal,
    /// Interval between periodic session snapshots (seconds).
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

fn default_shares_per_trade() -> Decimal {
    Decimal::from(100)
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shares_per_trade: default_shares_per_trade(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), String> {
        if self.shares_per_trade <= Decimal::ZERO {
            return Err(format!(
                "shares_per_trade ({}) must be positive",
                self.shares_per_trade
            ));
        }
        if self.snapshot_interval_secs == 0 {
            return Err("snapshot_interval_secs must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Base directory for snapshots and the trade journal.
    pub data_dir: String,
    /// Journal records buffered before flush.
    pub buffer_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            buffer_size: 50,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter directive; `RUST_LOG` overrides it.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info,pivot=debug".to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Levels to trade this session.
    #[serde(default)]
    pub levels: Vec<LevelConfig>,
    /// Bar aggregation configuration.
    #[serde(default)]
    pub bars: BarsConfig,
    /// Volume-delta estimation configuration.
    #[serde(default)]
    pub flow: FlowConfig,
    /// Entry confirmation configuration.
    #[serde(default)]
    pub entry: EntryConfig,
    /// Position lifecycle configuration.
    #[serde(default)]
    pub position: PositionConfig,
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            bars: BarsConfig::default(),
            flow: FlowConfig::default(),
            entry: EntryConfig::default(),
            position: PositionConfig::default(),
            engine: EngineConfig::default(),
            persistence: PersistenceConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> AppResult<()> {
        self.bars.validate().map_err(AppError::Config)?;
        self.flow.validate().map_err(AppError::Config)?;
        self.entry.validate().map_err(AppError::Config)?;
        self.position.validate().map_err(AppError::Config)?;
        self.engine.validate().map_err(AppError::Config)?;
        for level in &self.levels {
            level.validate().map_err(AppError::Config)?;
        }
        Ok(())
    }

    /// Build level plans for all configured levels.
    #[must_use]
    pub fn plans(&self) -> Vec<LevelPlan> {
        self.levels.iter().map(LevelConfig::to_plan).collect()
    }
}
