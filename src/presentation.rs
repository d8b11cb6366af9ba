//! Chart and share-card figures derived from a daily snapshot

use serde::{Deserialize, Serialize};

use crate::escalation::{RiskLevel, CRITICAL_THRESHOLD};
use crate::types::DailySnapshot;

/// Figures the UI renders for a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBreakdown {
    pub record_date: String,
    pub total_interactions: u64,
    /// Share of taps in total interactions, 0-100
    pub taps_percent: f64,
    /// Share of scroll events in total interactions, 0-100
    pub scroll_percent: f64,
    /// Progress toward the critical tier, capped at 100
    pub risk_percent: f64,
    pub level: RiskLevel,
    pub color: String,
}

/// Display color for a tier
pub fn level_color(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::None => "#4CAF50",
        RiskLevel::High => "#FFC107",
        RiskLevel::VeryHigh => "#FF9800",
        RiskLevel::Critical => "#F44336",
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl RiskBreakdown {
    pub fn from_snapshot(snapshot: &DailySnapshot) -> Self {
        let total = snapshot.total_interactions();
        let level = RiskLevel::from_total(total);

        let (taps_percent, scroll_percent) = if total == 0 {
            (0.0, 0.0)
        } else {
            let taps = round1(snapshot.taps_count as f64 * 100.0 / total as f64);
            (taps, round1(100.0 - taps))
        };

        let risk_percent = round1((total as f64 * 100.0 / CRITICAL_THRESHOLD as f64).min(100.0));

        Self {
            record_date: snapshot.record_date.clone(),
            total_interactions: total,
            taps_percent,
            scroll_percent,
            risk_percent,
            level,
            color: level_color(level).to_string(),
        }
    }
}
