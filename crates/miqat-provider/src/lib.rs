//! `miqat-provider` — cache-or-compute access to daily prayer schedules.
//!
//! [`ScheduleProvider`] is the only component allowed to write to the
//! schedule store. A cache hit is authoritative; a miss calls the
//! [`AstronomicalCalculator`] once per date no matter how many callers are
//! waiting, stores the result and hands it to all of them.

pub mod calculator;
pub mod error;
pub mod provider;
pub mod timetable;

pub use calculator::{AstronomicalCalculator, CalculatorError};
pub use error::{ProviderError, Result};
pub use provider::ScheduleProvider;
pub use timetable::TimetableCalculator;
