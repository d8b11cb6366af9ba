//! Escalation evaluation
//!
//! Maps a daily interaction snapshot to a discrete risk tier and gates local
//! notifications so each tier fires at most once per day.
//!
//! Tiers are keyed on `taps + scroll events`:
//!
//! | total      | level |
//! |------------|-------|
//! | < 801      | 0     |
//! | 801-1200   | 3     |
//! | 1201-1700  | 4     |
//! | >= 1701    | 5     |
//!
//! Levels 1 and 2 are reserved. Gating compares absolute level numbers.

use serde::{Deserialize, Serialize};

use crate::types::DailySnapshot;

/// Lowest total that reaches the high tier
pub const HIGH_THRESHOLD: u64 = 801;

/// Lowest total that reaches the very high tier
pub const VERY_HIGH_THRESHOLD: u64 = 1201;

/// Lowest total that reaches the critical tier
pub const CRITICAL_THRESHOLD: u64 = 1701;

/// Discrete risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskLevel {
    None,
    High,
    VeryHigh,
    Critical,
}

impl RiskLevel {
    /// Tier for a number of interactions
    pub fn from_total(total: u64) -> Self {
        if total >= CRITICAL_THRESHOLD {
            RiskLevel::Critical
        } else if total >= VERY_HIGH_THRESHOLD {
            RiskLevel::VeryHigh
        } else if total >= HIGH_THRESHOLD {
            RiskLevel::High
        } else {
            RiskLevel::None
        }
    }

    /// Numeric level (0, 3, 4, 5)
    pub fn as_u8(self) -> u8 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::High => 3,
            RiskLevel::VeryHigh => 4,
            RiskLevel::Critical => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RiskLevel::None),
            3 => Ok(RiskLevel::High),
            4 => Ok(RiskLevel::VeryHigh),
            5 => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level {other}")),
        }
    }
}

/// Evaluator output: tier plus the reminder copy for that tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub level: RiskLevel,
    pub title: String,
    pub body: String,
}

impl Escalation {
    /// Whether this escalation can ever produce a notification
    pub fn is_actionable(&self) -> bool {
        self.level != RiskLevel::None
    }
}

/// Evaluate a snapshot. Pure, no I/O.
pub fn evaluate(snapshot: &DailySnapshot) -> Escalation {
    let level = RiskLevel::from_total(snapshot.total_interactions());
    let (title, body) = copy_for(level);

    Escalation {
        level,
        title: title.to_string(),
        body: body.to_string(),
    }
}

fn copy_for(level: RiskLevel) -> (&'static str, &'static str) {
    match level {
        RiskLevel::None => ("", ""),
        RiskLevel::High => (
            "Uso alto del teléfono",
            "Llevas bastante tiempo interactuando con la pantalla. Es un buen momento para una pausa corta.",
        ),
        RiskLevel::VeryHigh => (
            "Uso muy alto del teléfono",
            "Tu actividad de hoy es muy intensa. Descansa la vista unos minutos y estira el cuerpo.",
        ),
        RiskLevel::Critical => (
            "Uso crítico del teléfono",
            "Has superado el nivel crítico de interacción de hoy. Deja el teléfono y tómate un descanso real.",
        ),
    }
}

/// Per-process notification gate
///
/// A notification fires only when the new level strictly exceeds the level
/// already notified for the same date. A new date resets the level to 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationState {
    pub last_notified_date: Option<String>,
    pub last_notified_level: u8,
}

impl EscalationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level already notified for `date`, 0 when the day rolled over
    pub fn level_for(&self, date: &str) -> u8 {
        match &self.last_notified_date {
            Some(last) if last == date => self.last_notified_level,
            _ => 0,
        }
    }

    /// Check without mutating
    pub fn should_notify(&self, date: &str, escalation: &Escalation) -> bool {
        escalation.is_actionable() && escalation.level.as_u8() > self.level_for(date)
    }

    /// Apply the gate; records the new level and returns true when a
    /// notification should fire.
    pub fn observe(&mut self, date: &str, escalation: &Escalation) -> bool {
        if !self.should_notify(date, escalation) {
            return false;
        }
        self.last_notified_date = Some(date.to_string());
        self.last_notified_level = escalation.level.as_u8();
        true
    }

    /// Undo a claim made by [`observe`](Self::observe) if nothing newer has
    /// been recorded since.
    pub fn revert(&mut self, date: &str, level: RiskLevel, previous: EscalationState) {
        if self.last_notified_date.as_deref() == Some(date)
            && self.last_notified_level == level.as_u8()
        {
            *self = previous;
        }
    }
}
