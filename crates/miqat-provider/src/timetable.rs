use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use miqat_core::{CalculationConfig, Madhab, PrayerTimes};
use serde::Deserialize;
use tracing::info;

use crate::calculator::{AstronomicalCalculator, CalculatorError};

/// One row of a published timetable, times in local wall-clock `HH:MM`.
#[derive(Debug, Clone, Deserialize)]
struct TimetableDay {
    date: NaiveDate,
    fajr: String,
    dhuhr: String,
    asr: String,
    /// Later Asr used when the config asks for the Hanafi variant.
    #[serde(default)]
    asr_hanafi: Option<String>,
    maghrib: String,
    isha: String,
}

#[derive(Debug, Deserialize)]
struct TimetableFile {
    #[serde(default)]
    days: Vec<TimetableDay>,
}

/// Calculator backed by a mosque's published timetable.
///
/// ```toml
/// [[days]]
/// date = "2024-01-15"
/// fajr = "05:12"
/// dhuhr = "12:08"
/// asr = "15:31"
/// asr_hanafi = "16:05"
/// maghrib = "17:46"
/// isha = "19:10"
/// ```
///
/// Local times are resolved in the requesting config's time zone. Dates the
/// table does not cover fail with [`CalculatorError::MissingDay`].
pub struct TimetableCalculator {
    days: HashMap<NaiveDate, TimetableDay>,
}

impl TimetableCalculator {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalculatorError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CalculatorError::Timetable(format!(
                "timetable not found: {}",
                path.display()
            )));
        }
        let file: TimetableFile = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| CalculatorError::Timetable(e.to_string()))?;
        info!(path = %path.display(), days = file.days.len(), "timetable loaded");
        Ok(Self::from_days(file.days))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, CalculatorError> {
        let file: TimetableFile = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| CalculatorError::Timetable(e.to_string()))?;
        Ok(Self::from_days(file.days))
    }

    fn from_days(days: Vec<TimetableDay>) -> Self {
        Self {
            days: days.into_iter().map(|d| (d.date, d)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[async_trait]
impl AstronomicalCalculator for TimetableCalculator {
    fn name(&self) -> &str {
        "timetable"
    }

    async fn calculate(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerTimes, CalculatorError> {
        let day = self
            .days
            .get(&date)
            .ok_or(CalculatorError::MissingDay { date })?;
        let tz = config.time_zone;

        let asr = match (config.madhab, &day.asr_hanafi) {
            (Madhab::Hanafi, Some(later)) => later,
            _ => &day.asr,
        };

        Ok(PrayerTimes {
            fajr: resolve(date, &day.fajr, tz)?,
            dhuhr: resolve(date, &day.dhuhr, tz)?,
            asr: resolve(date, asr, tz)?,
            maghrib: resolve(date, &day.maghrib, tz)?,
            isha: resolve(date, &day.isha, tz)?,
        })
    }
}

/// Local `HH:MM` (or `HH:MM:SS`) on `date` in `tz`, as a UTC instant.
fn resolve(date: NaiveDate, time: &str, tz: Tz) -> Result<DateTime<Utc>, CalculatorError> {
    let local = NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .map_err(|e| CalculatorError::Timetable(format!("bad time {time:?} on {date}: {e}")))?;

    // Ambiguous wall-clock times (DST fall-back) take the earlier instant.
    tz.from_local_datetime(&date.and_time(local))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CalculatorError::NonexistentLocalTime {
            date,
            time: time.to_string(),
            zone: tz.name().to_string(),
        })
}
