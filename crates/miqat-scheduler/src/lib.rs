//! `miqat-scheduler` — decides when to wake and keeps the cache warm.
//!
//! # Overview
//!
//! On every wake the [`RefreshScheduler`] preloads a rolling window of days
//! through the schedule provider, drops entries past retention, and plans the
//! next wake from scratch. Location changes trigger a small correction of
//! today and tomorrow only.
//!
//! # Wake priority
//!
//! | Order | Candidate                                      |
//! |-------|------------------------------------------------|
//! | 1     | Next unexpired prayer instant today            |
//! | 2     | Pre-alert lead (5 min) before that instant     |
//! | 3     | Next local midnight                            |
//! | 4     | Periodic interval in the active daypart, else midnight |
//!
//! The first candidate that lies strictly in the future wins.

pub mod error;
pub mod jobs;
pub mod location;
pub mod refresh;
pub mod wake;

pub use error::{Result, SchedulerError};
pub use jobs::{BackgroundJobs, LoggingJobs};
pub use location::{LocationChange, LocationTracker};
pub use refresh::{ForegroundAction, PreloadReport, RefreshScheduler};
pub use wake::{next_wake, WakePlan, WakePolicy, WakeReason};
