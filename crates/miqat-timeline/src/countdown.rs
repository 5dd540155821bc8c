use std::collections::BTreeMap;

use chrono::{DateTime, Days, Utc};
use miqat_core::clock::local_date;
use miqat_store::ScheduleReader;
use serde::Serialize;
use tracing::{debug, warn};

use crate::generator::TimelineGenerator;
use crate::types::TimelineEntry;

/// Placeholder shown when no trustworthy schedule is cached.
pub const UNAVAILABLE_MESSAGE: &str = "data unavailable, open app to refresh";

/// Days after today handed to the generator.
const LOOKAHEAD_DAYS: u64 = 3;

/// What a countdown surface renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CountdownState {
    Ready {
        entries: Vec<TimelineEntry>,
        /// Today's schedule is older than the staleness window.
        stale: bool,
    },
    Unavailable {
        message: &'static str,
    },
}

impl CountdownState {
    pub fn unavailable() -> Self {
        CountdownState::Unavailable {
            message: UNAVAILABLE_MESSAGE,
        }
    }

    /// Build the surface state from read-only cache lookups.
    ///
    /// Today's schedule must be cached: counting down to a later day's prayer
    /// while today's are unknown would show the wrong prayer.
    pub fn load<R>(reader: &R, generator: &TimelineGenerator, now: DateTime<Utc>) -> Self
    where
        R: ScheduleReader + ?Sized,
    {
        let today = local_date(now, generator.time_zone());
        let until = today
            .checked_add_days(Days::new(LOOKAHEAD_DAYS))
            .unwrap_or(today);

        let cached = match reader.range(today, until) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(%today, "countdown read failed: {e}");
                return Self::unavailable();
            }
        };

        let Some(stale) = cached
            .iter()
            .find(|entry| entry.date() == today)
            .map(|entry| entry.is_stale(now))
        else {
            debug!(%today, "no schedule cached for today");
            return Self::unavailable();
        };

        let schedules: BTreeMap<_, _> = cached
            .into_iter()
            .map(|entry| (entry.date(), entry.schedule))
            .collect();
        let entries = generator.generate(&schedules, now);
        if entries.is_empty() {
            return Self::unavailable();
        }
        CountdownState::Ready { entries, stale }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CountdownState::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use chrono_tz::Tz;
    use miqat_core::{CalculationMethod, PrayerKind, PrayerSchedule, PrayerTimes};
    use miqat_store::{CacheEntry, MemoryScheduleStore, ScheduleStore, StoreError};

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    fn entry(d: u32, last_written: DateTime<Utc>) -> CacheEntry {
        let schedule = PrayerSchedule::new(
            NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            PrayerTimes {
                fajr: utc(d, 5, 12),
                dhuhr: utc(d, 12, 8),
                asr: utc(d, 15, 31),
                maghrib: utc(d, 17, 46),
                isha: utc(d, 19, 10),
            },
            CalculationMethod::Egyptian,
        )
        .unwrap();
        CacheEntry::new(schedule, last_written)
    }

    fn store_with(days: &[u32], last_written: DateTime<Utc>) -> MemoryScheduleStore {
        let store = MemoryScheduleStore::new();
        for &d in days {
            let e = entry(d, last_written);
            store.put(e.date(), &e).unwrap();
        }
        store
    }

    fn generator() -> TimelineGenerator {
        TimelineGenerator::new(Tz::UTC, 48)
    }

    #[test]
    fn ready_with_fresh_schedule() {
        let now = utc(15, 17, 44);
        let store = store_with(&[15, 16], now - Duration::hours(1));

        match CountdownState::load(&store, &generator(), now) {
            CountdownState::Ready { entries, stale } => {
                assert!(!stale);
                assert_eq!(entries[0].next_prayer, PrayerKind::Maghrib);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn old_schedule_is_flagged_stale() {
        let now = utc(15, 9, 0);
        let store = store_with(&[15], now - Duration::hours(30));

        let state = CountdownState::load(&store, &generator(), now);
        assert!(matches!(state, CountdownState::Ready { stale: true, .. }));
    }

    #[test]
    fn missing_today_is_unavailable_even_with_tomorrow_cached() {
        let now = utc(15, 9, 0);
        let store = store_with(&[16, 17], now);

        assert_eq!(
            CountdownState::load(&store, &generator(), now),
            CountdownState::unavailable()
        );
    }

    #[test]
    fn exhausted_window_is_unavailable() {
        let now = utc(15, 22, 0);
        let store = store_with(&[15], now);
        assert!(!CountdownState::load(&store, &generator(), now).is_ready());
    }

    struct FailingReader;

    impl ScheduleReader for FailingReader {
        fn get(&self, _date: NaiveDate) -> miqat_store::Result<Option<CacheEntry>> {
            Err(StoreError::LockPoisoned)
        }
        fn range(&self, _from: NaiveDate, _to: NaiveDate) -> miqat_store::Result<Vec<CacheEntry>> {
            Err(StoreError::LockPoisoned)
        }
    }

    #[test]
    fn read_errors_show_placeholder() {
        let state = CountdownState::load(&FailingReader, &generator(), utc(15, 9, 0));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "unavailable",
                "message": "data unavailable, open app to refresh",
            })
        );
    }
}
