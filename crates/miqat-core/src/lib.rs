//! `miqat-core` — shared domain types, configuration and errors.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use config::MiqatConfig;
pub use error::{MiqatError, Result};
pub use types::{
    CalculationConfig, CalculationMethod, Coordinate, Madhab, PrayerKind, PrayerSchedule,
    PrayerTimes,
};
