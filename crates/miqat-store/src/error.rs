use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by schedule stores. Stores never retry on their own.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted record could not be turned back into a valid schedule.
    #[error("Corrupt cache entry for {date}: {reason}")]
    Corrupt { date: NaiveDate, reason: String },

    /// A writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
