//! Local calendar helpers. Schedules are keyed by the date as seen in the
//! configured time zone, not by the UTC date.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`.
///
/// Some zones skip local midnight on DST change days; the day then starts at
/// the first wall-clock hour that exists.
pub fn start_of_local_day(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    (0..4).find_map(|hour| {
        let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// The next local midnight strictly after `now`.
pub fn next_local_midnight(now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let tomorrow = local_date(now, tz).succ_opt()?;
    start_of_local_day(tomorrow, tz)
}

/// Hour of day (0-23) of `instant` on the local clock.
pub fn local_hour(instant: DateTime<Utc>, tz: Tz) -> u32 {
    instant.with_timezone(&tz).hour()
}
