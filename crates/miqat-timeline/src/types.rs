use chrono::{DateTime, Duration, Utc};
use miqat_core::{PrayerKind, PrayerSchedule};
use serde::Serialize;

/// Why an entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "prayer", rename_all = "snake_case")]
pub enum EntryKind {
    Seed,
    Cadence,
    /// Imminent warning ahead of this prayer.
    PreAlert(PrayerKind),
    /// This prayer begins; the highlight moves on.
    Transition(PrayerKind),
    DayRoll,
}

/// One display state, valid from `at` until the next entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub kind: EntryKind,
    pub next_prayer: PrayerKind,
    pub next_prayer_at: DateTime<Utc>,
    /// Seconds from `at` until `next_prayer_at`.
    pub remaining_secs: i64,
    pub relevance: f64,
    /// Schedule the next prayer belongs to.
    pub schedule: PrayerSchedule,
}

impl TimelineEntry {
    pub fn remaining(&self) -> Duration {
        Duration::seconds(self.remaining_secs)
    }
}

/// Urgency of an entry from the time left until the next prayer.
///
/// Non-increasing in `remaining`: `<= 30 min -> 1.0`, `<= 60 min -> 0.8`,
/// `<= 180 min -> 0.6`, otherwise `0.3`.
pub fn relevance(remaining: Duration) -> f64 {
    let mins = remaining.num_seconds() as f64 / 60.0;
    if mins <= 30.0 {
        1.0
    } else if mins <= 60.0 {
        0.8
    } else if mins <= 180.0 {
        0.6
    } else {
        0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_thresholds_are_inclusive() {
        assert_eq!(relevance(Duration::minutes(2)), 1.0);
        assert_eq!(relevance(Duration::minutes(30)), 1.0);
        assert_eq!(relevance(Duration::minutes(30) + Duration::seconds(1)), 0.8);
        assert_eq!(relevance(Duration::minutes(60)), 0.8);
        assert_eq!(relevance(Duration::minutes(61)), 0.6);
        assert_eq!(relevance(Duration::minutes(180)), 0.6);
        assert_eq!(relevance(Duration::minutes(181)), 0.3);
        assert_eq!(relevance(Duration::hours(20)), 0.3);
    }

    #[test]
    fn relevance_never_increases_with_time_left() {
        let mut last = 1.0;
        for mins in 0..24 * 60 {
            let r = relevance(Duration::minutes(mins));
            assert!(r <= last, "relevance rose at {mins} min");
            last = r;
        }
    }

    #[test]
    fn entry_kind_serializes_with_prayer() {
        let json = serde_json::to_value(EntryKind::PreAlert(PrayerKind::Asr)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "pre_alert", "prayer": "asr" }));
        let json = serde_json::to_value(EntryKind::Seed).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "seed" }));
    }
}
