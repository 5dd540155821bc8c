use chrono::{DateTime, Duration, NaiveDate, Utc};
use miqat_core::PrayerSchedule;

/// Entries older than this are stale and warrant a soft refresh.
pub const STALE_AFTER_HOURS: i64 = 24;
/// Entries older than this may be refreshed opportunistically.
pub const REFRESH_AFTER_MINS: i64 = 5;

/// A persisted schedule plus the time it was last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub schedule: PrayerSchedule,
    pub last_written: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(schedule: PrayerSchedule, last_written: DateTime<Utc>) -> Self {
        Self {
            schedule,
            last_written,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.schedule.date()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_written
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        is_stale(self, now)
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        needs_refresh(self, now)
    }
}

/// `now - last_written > 24h`. Advisory only; nothing is deleted.
pub fn is_stale(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    entry.age(now) > Duration::hours(STALE_AFTER_HOURS)
}

/// `now - last_written > 5min`.
pub fn needs_refresh(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    entry.age(now) > Duration::minutes(REFRESH_AFTER_MINS)
}
