//! `miqat-store` — durable date-keyed cache of computed prayer schedules.
//!
//! # Overview
//!
//! One record per calendar date holds the five instants, the method that
//! produced them and a `last_written` timestamp. Readers see either the old or
//! the new record during a concurrent write, never a mix.
//!
//! | Implementation          | Backing                                  |
//! |-------------------------|------------------------------------------|
//! | [`SqliteScheduleStore`] | `prayer_schedules` table in SQLite       |
//! | [`MemoryScheduleStore`] | `BTreeMap` behind an `RwLock` (tests)    |

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryScheduleStore;
pub use store::{ScheduleReader, ScheduleStore, SqliteScheduleStore};
pub use types::{is_stale, needs_refresh, CacheEntry, REFRESH_AFTER_MINS, STALE_AFTER_HOURS};
