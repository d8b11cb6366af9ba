//! In-process interaction aggregator
//!
//! The host feeds raw tap, scroll and foreground events; the aggregator keeps
//! one day-bucket of cumulative counters and rolls it over at local midnight.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::PauseError;
use crate::sources::MetricsSource;
use crate::types::{AppUsage, DailySnapshot, UsageSnapshot, DATE_FORMAT};

/// Hour at which the night window starts (local time)
const NIGHT_START_HOUR: u32 = 22;

/// Hour at which the night window ends (local time)
const NIGHT_END_HOUR: u32 = 6;

/// Counters for a single calendar day
#[derive(Debug, Clone)]
struct DayBucket {
    date: NaiveDate,
    taps: u64,
    scroll_events: u64,
    scroll_speed_sum: f64,
    scroll_speed_samples: u64,
    sessions: u32,
    longest_session_sec: u64,
    night_sec: u64,
    per_app: HashMap<String, u64>,
}

impl DayBucket {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            taps: 0,
            scroll_events: 0,
            scroll_speed_sum: 0.0,
            scroll_speed_samples: 0,
            sessions: 0,
            longest_session_sec: 0,
            night_sec: 0,
            per_app: HashMap::new(),
        }
    }

    fn avg_scroll_speed(&self) -> f64 {
        if self.scroll_speed_samples == 0 {
            return 0.0;
        }
        self.scroll_speed_sum / self.scroll_speed_samples as f64
    }

    fn to_daily(&self) -> DailySnapshot {
        DailySnapshot {
            record_date: self.date.format(DATE_FORMAT).to_string(),
            taps_count: self.taps,
            scroll_events: self.scroll_events,
            avg_scroll_speed: self.avg_scroll_speed(),
        }
    }

    fn to_usage(&self) -> UsageSnapshot {
        let mut details: Vec<AppUsage> = self
            .per_app
            .iter()
            .map(|(package, secs)| AppUsage {
                package_name: package.clone(),
                foreground_seconds: *secs,
            })
            .collect();
        details.sort_by(|a, b| {
            b.foreground_seconds
                .cmp(&a.foreground_seconds)
                .then_with(|| a.package_name.cmp(&b.package_name))
        });

        UsageSnapshot {
            usage_date: self.date.format(DATE_FORMAT).to_string(),
            total_usage_seconds: details.iter().map(|d| d.foreground_seconds).sum(),
            sessions_count: self.sessions,
            longest_session_seconds: self.longest_session_sec,
            night_usage: self.night_sec,
            details,
        }
    }
}

/// Day-bucketed accumulator of raw interaction events
#[derive(Debug)]
pub struct InteractionAggregator {
    bucket: Mutex<Option<DayBucket>>,
}

impl Default for InteractionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionAggregator {
    pub fn new() -> Self {
        Self {
            bucket: Mutex::new(None),
        }
    }

    /// Run `f` on the bucket for `date`, rolling over when the date moved
    /// forward. Events for an earlier date than the current bucket are dropped.
    fn with_bucket<R>(&self, date: NaiveDate, f: impl FnOnce(&mut DayBucket) -> R) -> Option<R> {
        let mut guard = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match guard.as_ref() {
            Some(bucket) if bucket.date > date => return None,
            Some(bucket) if bucket.date == date => {}
            _ => *guard = Some(DayBucket::new(date)),
        }

        guard.as_mut().map(f)
    }

    /// Record `count` taps at local time `at`
    pub fn record_taps(&self, at: NaiveDateTime, count: u64) {
        self.with_bucket(at.date(), |bucket| {
            bucket.taps = bucket.taps.saturating_add(count);
        });
    }

    /// Record one scroll event with an optional device-computed speed
    pub fn record_scroll(&self, at: NaiveDateTime, speed: Option<f64>) {
        self.with_bucket(at.date(), |bucket| {
            bucket.scroll_events = bucket.scroll_events.saturating_add(1);
            if let Some(speed) = speed.filter(|s| s.is_finite() && *s >= 0.0) {
                bucket.scroll_speed_sum += speed;
                bucket.scroll_speed_samples += 1;
            }
        });
    }

    /// Record one foreground session of `package` between `start` and `end`
    ///
    /// Sessions that began before midnight only count their part inside the
    /// day they ended on.
    pub fn record_foreground(&self, package: &str, start: NaiveDateTime, end: NaiveDateTime) {
        if end <= start {
            return;
        }

        let day = end.date();
        let midnight = day.and_time(NaiveTime::MIN);
        let start = start.max(midnight);
        let seconds = (end - start).num_seconds().max(0) as u64;
        let night = night_overlap_secs(day, start, end);

        self.with_bucket(day, |bucket| {
            bucket.sessions += 1;
            bucket.longest_session_sec = bucket.longest_session_sec.max(seconds);
            bucket.night_sec += night;
            *bucket.per_app.entry(package.to_string()).or_insert(0) += seconds;
        });
    }

    /// Daily snapshot as of local time `now`
    pub fn daily_at(&self, now: NaiveDateTime) -> Option<DailySnapshot> {
        self.with_bucket(now.date(), |bucket| bucket.to_daily())
    }

    /// Usage snapshot as of local time `now`
    pub fn usage_at(&self, now: NaiveDateTime) -> Option<UsageSnapshot> {
        self.with_bucket(now.date(), |bucket| bucket.to_usage())
    }
}

/// Seconds of `[start, end)` inside the night windows of `day`
fn night_overlap_secs(day: NaiveDate, start: NaiveDateTime, end: NaiveDateTime) -> u64 {
    let midnight = day.and_time(NaiveTime::MIN);
    let windows = [
        (midnight, midnight + Duration::hours(NIGHT_END_HOUR as i64)),
        (
            midnight + Duration::hours(NIGHT_START_HOUR as i64),
            midnight + Duration::days(1),
        ),
    ];

    windows
        .iter()
        .map(|(from, to)| {
            let lo = start.max(*from);
            let hi = end.min(*to);
            if hi > lo {
                (hi - lo).num_seconds() as u64
            } else {
                0
            }
        })
        .sum()
}

#[async_trait]
impl MetricsSource for InteractionAggregator {
    fn name(&self) -> &str {
        "aggregator"
    }

    async fn daily_snapshot(&self) -> Result<Option<DailySnapshot>, PauseError> {
        Ok(self.daily_at(Local::now().naive_local()))
    }

    async fn usage_snapshot(&self) -> Result<Option<UsageSnapshot>, PauseError> {
        Ok(self.usage_at(Local::now().naive_local()))
    }
}
