use std::collections::BTreeMap;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use miqat_core::clock::{local_date, start_of_local_day};
use miqat_core::config::TimelineConfig;
use miqat_core::{PrayerKind, PrayerSchedule};

use crate::types::{relevance, EntryKind, TimelineEntry};

const CADENCE_STEP_MINS: i64 = 5;
const CADENCE_COUNT: i64 = 12;
const PRE_ALERT_MINS: i64 = 5;
const DAY_ROLLS: u64 = 3;

/// Builds timelines for one time zone with a fixed entry cap.
#[derive(Debug, Clone)]
pub struct TimelineGenerator {
    tz: Tz,
    max_entries: usize,
}

impl TimelineGenerator {
    pub fn new(tz: Tz, max_entries: usize) -> Self {
        Self { tz, max_entries }
    }

    pub fn from_config(cfg: &TimelineConfig, tz: Tz) -> Self {
        Self::new(tz, cfg.max_entries)
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Project `schedules` into display entries as seen at `now`.
    ///
    /// Every entry describes the first prayer strictly after its own
    /// timestamp; an entry with no such prayer in `schedules` is dropped, so an
    /// empty map (or one where everything has passed) gives an empty list.
    pub fn generate(
        &self,
        schedules: &BTreeMap<NaiveDate, PrayerSchedule>,
        now: DateTime<Utc>,
    ) -> Vec<TimelineEntry> {
        let mut candidates: Vec<(DateTime<Utc>, EntryKind)> = vec![(now, EntryKind::Seed)];

        for step in 1..=CADENCE_COUNT {
            let at = now + Duration::minutes(step * CADENCE_STEP_MINS);
            candidates.push((at, EntryKind::Cadence));
        }

        for schedule in schedules.values() {
            for (kind, at) in schedule.times().iter() {
                if at > now {
                    candidates.push((at, EntryKind::Transition(kind)));
                }
                let alert = at - Duration::minutes(PRE_ALERT_MINS);
                if alert > now {
                    candidates.push((alert, EntryKind::PreAlert(kind)));
                }
            }
        }

        let today = local_date(now, self.tz);
        for offset in 1..=DAY_ROLLS {
            if let Some(midnight) = today
                .checked_add_days(Days::new(offset))
                .and_then(|date| start_of_local_day(date, self.tz))
            {
                candidates.push((midnight, EntryKind::DayRoll));
            }
        }

        // Stable, so the first emitted entry wins a timestamp tie.
        candidates.sort_by_key(|(at, _)| *at);
        candidates.dedup_by_key(|(at, _)| *at);

        candidates
            .into_iter()
            .filter_map(|(at, kind)| entry_at(schedules, at, kind))
            .take(self.max_entries)
            .collect()
    }
}

fn entry_at(
    schedules: &BTreeMap<NaiveDate, PrayerSchedule>,
    at: DateTime<Utc>,
    kind: EntryKind,
) -> Option<TimelineEntry> {
    let (schedule, next_prayer, next_prayer_at) = next_prayer(schedules, at)?;
    let remaining = next_prayer_at - at;
    Some(TimelineEntry {
        at,
        kind,
        next_prayer,
        next_prayer_at,
        remaining_secs: remaining.num_seconds(),
        relevance: relevance(remaining),
        schedule: schedule.clone(),
    })
}

/// Earliest prayer strictly after `at` across all schedules.
fn next_prayer(
    schedules: &BTreeMap<NaiveDate, PrayerSchedule>,
    at: DateTime<Utc>,
) -> Option<(&PrayerSchedule, PrayerKind, DateTime<Utc>)> {
    schedules
        .values()
        .filter_map(|s| s.next_after(at).map(|(kind, instant)| (s, kind, instant)))
        .min_by_key(|(_, _, instant)| *instant)
}
