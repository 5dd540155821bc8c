//! `miqat-timeline` — pure projection of cached schedules into display entries.
//!
//! # Overview
//!
//! [`TimelineGenerator::generate`] turns a map of schedules plus "now" into an
//! ascending, deduplicated list of [`TimelineEntry`] values. It never touches
//! the cache and never suspends; identical inputs give identical output.
//!
//! | Entry       | Emitted at                                   |
//! |-------------|----------------------------------------------|
//! | Seed        | `now`                                        |
//! | Cadence     | every 5 minutes for the next hour            |
//! | PreAlert    | 5 minutes before each future prayer          |
//! | Transition  | each future prayer instant                   |
//! | DayRoll     | the next 3 local midnights                   |
//!
//! [`CountdownState`] is what a countdown surface renders: either a timeline
//! or a placeholder asking the user to open the app.

pub mod countdown;
pub mod generator;
pub mod types;

pub use countdown::{CountdownState, UNAVAILABLE_MESSAGE};
pub use generator::TimelineGenerator;
pub use types::{relevance, EntryKind, TimelineEntry};
