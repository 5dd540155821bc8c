use chrono::NaiveDate;
use thiserror::Error;

use crate::types::PrayerKind;

#[derive(Debug, Error)]
pub enum MiqatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prayer times for {date} out of order: {earlier} is not before {later}")]
    OutOfOrder {
        date: NaiveDate,
        earlier: PrayerKind,
        later: PrayerKind,
    },

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),
}

impl MiqatError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            MiqatError::Config(_) => "CONFIG_ERROR",
            MiqatError::OutOfOrder { .. } => "SCHEDULE_OUT_OF_ORDER",
            MiqatError::UnknownTimeZone(_) => "UNKNOWN_TIME_ZONE",
        }
    }
}

pub type Result<T> = std::result::Result<T, MiqatError>;
