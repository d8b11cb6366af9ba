//! Core data types for the wellbeing pipeline
//!
//! Wire-facing structs serialize with the camelCase field names the backend
//! metrics API expects.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PauseError;

/// Date format used for bucket keys (`recordDate`, `usageDate`)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cumulative interaction counters for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    /// Calendar date (YYYY-MM-DD), the aggregation bucket key
    pub record_date: String,
    /// Taps since local midnight
    pub taps_count: u64,
    /// Scroll events since local midnight
    pub scroll_events: u64,
    /// Average scroll speed as computed by the device
    #[serde(default)]
    pub avg_scroll_speed: f64,
}

impl DailySnapshot {
    pub fn new(record_date: impl Into<String>, taps_count: u64, scroll_events: u64) -> Self {
        Self {
            record_date: record_date.into(),
            taps_count,
            scroll_events,
            avg_scroll_speed: 0.0,
        }
    }

    /// Taps plus scroll events
    pub fn total_interactions(&self) -> u64 {
        self.taps_count.saturating_add(self.scroll_events)
    }

    /// Parse the bucket key into a calendar date
    pub fn date(&self) -> Result<NaiveDate, PauseError> {
        NaiveDate::parse_from_str(&self.record_date, DATE_FORMAT)
            .map_err(|e| PauseError::InvalidDate(format!("{}: {}", self.record_date, e)))
    }
}

/// Foreground time for a single app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub package_name: String,
    pub foreground_seconds: u64,
}

/// Per-app foreground usage for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub usage_date: String,
    pub total_usage_seconds: u64,
    pub sessions_count: u32,
    pub longest_session_seconds: u64,
    /// Seconds of use inside the night window (22:00-06:00 local)
    pub night_usage: u64,
    /// Sorted by foreground time, longest first
    #[serde(default)]
    pub details: Vec<AppUsage>,
}

/// App lifecycle states reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl AppState {
    /// Whether moving from `self` to `next` counts as a resume
    pub fn is_resume_to(self, next: AppState) -> bool {
        self != AppState::Active && next == AppState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_wire_format() {
        let snapshot = DailySnapshot {
            record_date: "2024-01-01".to_string(),
            taps_count: 500,
            scroll_events: 400,
            avg_scroll_speed: 1.25,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "recordDate": "2024-01-01",
                "tapsCount": 500,
                "scrollEvents": 400,
                "avgScrollSpeed": 1.25
            })
        );
        assert_eq!(snapshot.total_interactions(), 900);
    }

    #[test]
    fn test_snapshot_missing_speed_defaults_to_zero() {
        let snapshot: DailySnapshot =
            serde_json::from_str(r#"{"recordDate":"2024-01-01","tapsCount":1,"scrollEvents":2}"#)
                .unwrap();
        assert_eq!(snapshot.avg_scroll_speed, 0.0);
    }

    #[test]
    fn test_snapshot_date_parsing() {
        let snapshot = DailySnapshot::new("2024-02-29", 0, 0);
        assert_eq!(snapshot.date().unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let bad = DailySnapshot::new("29/02/2024", 0, 0);
        assert!(matches!(bad.date(), Err(PauseError::InvalidDate(_))));
    }

    #[test]
    fn test_usage_wire_format() {
        let usage = UsageSnapshot {
            usage_date: "2024-01-01".to_string(),
            total_usage_seconds: 3600,
            sessions_count: 4,
            longest_session_seconds: 1800,
            night_usage: 600,
            details: vec![AppUsage {
                package_name: "com.video.app".to_string(),
                foreground_seconds: 3600,
            }],
        };

        let value = serde_json::to_value(&usage).unwrap();
        assert_eq!(value["usageDate"], "2024-01-01");
        assert_eq!(value["totalUsageSeconds"], 3600);
        assert_eq!(value["longestSessionSeconds"], 1800);
        assert_eq!(value["nightUsage"], 600);
        assert_eq!(value["details"][0]["packageName"], "com.video.app");
    }

    #[test]
    fn test_resume_transitions() {
        assert!(AppState::Background.is_resume_to(AppState::Active));
        assert!(AppState::Inactive.is_resume_to(AppState::Active));
        assert!(!AppState::Active.is_resume_to(AppState::Active));
        assert!(!AppState::Active.is_resume_to(AppState::Background));
    }
}
