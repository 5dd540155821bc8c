use async_trait::async_trait;
use chrono::NaiveDate;
use miqat_core::{CalculationConfig, PrayerTimes};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalculatorError {
    #[error("no prayer times available for {date}")]
    MissingDay { date: NaiveDate },

    #[error("local time {time} does not exist on {date} in {zone}")]
    NonexistentLocalTime {
        date: NaiveDate,
        time: String,
        zone: String,
    },

    #[error("timetable error: {0}")]
    Timetable(String),

    #[error("{0}")]
    Other(String),
}

/// Turns (date, location, method, madhab) into the day's five instants.
///
/// Implementations are treated as pure and may be slow; the provider bounds
/// every call with a timeout. Results are validated by the caller.
#[async_trait]
pub trait AstronomicalCalculator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn calculate(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerTimes, CalculatorError>;
}
