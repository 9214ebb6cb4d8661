//! Session entry window.
//!
//! New breakout attempts are only allowed to start inside this window;
//! attempts already in flight are unaffected by the window closing.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Time-of-day window during which new attempts may start (UTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryWindow {
    /// Start time in HH:MM format (UTC).
    pub start: String,
    /// End time in HH:MM format (UTC).
    pub end: String,
}

impl EntryWindow {
    /// Parse start time as NaiveTime.
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    /// Parse end time as NaiveTime.
    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end, "%H:%M").ok()
    }

    /// Check if a given time of day is within the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let start = match self.start_time() {
            Some(t) => t,
            None => return false,
        };
        let end = match self.end_time() {
            Some(t) => t,
            None => return false,
        };

        if start <= end {
            // Normal case: e.g., 14:30-20:30
            time >= start && time < end
        } else {
            // Wrap around midnight: e.g., 23:00-01:00
            time >= start || time < end
        }
    }

    /// Check a full UTC timestamp against the window.
    pub fn contains_utc(&self, at: DateTime<Utc>) -> bool {
        let time = NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second())
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        self.contains(time)
    }

    /// Validate that both bounds parse.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_time().is_none() {
            return Err(format!("invalid window start '{}', expected HH:MM", self.start));
        }
        if self.end_time().is_none() {
            return Err(format!("invalid window end '{}', expected HH:MM", self.end));
        }
        Ok(())
    }
}

impl Default for EntryWindow {
    fn default() -> Self {
        Self {
            start: "14:30".to_string(),
            end: "20:30".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_contains() {
        let window = EntryWindow {
            start: "14:30".to_string(),
            end: "20:30".to_string(),
        };
        assert!(window.contains(NaiveTime::from_hms_opt(14, 30, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(20, 30, 0).unwrap())); // End is exclusive
        assert!(!window.contains(NaiveTime::from_hms_opt(14, 29, 0).unwrap()));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let window = EntryWindow {
            start: "23:00".to_string(),
            end: "01:00".to_string(),
        };
        assert!(window.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(0, 30, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(22, 0, 0).unwrap()));
    }

    #[test]
    fn test_malformed_window_never_contains() {
        let window = EntryWindow {
            start: "not-a-time".to_string(),
            end: "20:30".to_string(),
        };
        assert!(!window.contains(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
        assert!(window.validate().is_err());
    }
}
