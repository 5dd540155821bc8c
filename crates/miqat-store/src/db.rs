use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schedule cache schema in `conn`.
///
/// Creates the `prayer_schedules` table (idempotent). Dates are stored as
/// `YYYY-MM-DD` so lexical order equals calendar order, which the range and
/// eviction queries rely on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS prayer_schedules (
            date          TEXT NOT NULL PRIMARY KEY,   -- YYYY-MM-DD
            fajr          TEXT NOT NULL,               -- RFC 3339 UTC
            dhuhr         TEXT NOT NULL,
            asr           TEXT NOT NULL,
            maghrib       TEXT NOT NULL,
            isha          TEXT NOT NULL,
            method        TEXT NOT NULL,
            last_written  TEXT NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}
