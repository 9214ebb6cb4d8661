//! Instrument identity and trade direction.
//!
//! `InstrumentId` is the stable key for all per-instrument state: the bar
//! series, the flow estimator, breakout trackers and open positions all
//! live in arenas keyed by it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable instrument identifier (ticker symbol).
///
/// Cheap to clone: the symbol is interned behind an `Arc<str>` so the id
/// can be copied into every event and intent without allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(Arc<str>);

impl InstrumentId {
    /// Create an instrument id from a symbol string.
    ///
    /// Symbols are normalized to uppercase.
    pub fn new(symbol: &str) -> Self {
        Self(Arc::from(symbol.to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trade direction: long (break above resistance) or short (break below
/// support).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns +1 for long, -1 for short (for P&L calculations).
    pub fn sign(&self) -> rust_decimal::Decimal {
        match self {
            Self::Long => rust_decimal::Decimal::ONE,
            Self::Short => rust_decimal::Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_instrument_id_normalized() {
        let id = InstrumentId::new("aapl");
        assert_eq!(id.as_str(), "AAPL");
    }

    #[test]
    fn test_instrument_id_equality() {
        assert_eq!(InstrumentId::new("MSFT"), InstrumentId::new("msft"));
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn test_side_sign() {
        assert_eq!(Side::Long.sign(), Decimal::ONE);
        assert_eq!(Side::Short.sign(), Decimal::NEGATIVE_ONE);
    }
}
