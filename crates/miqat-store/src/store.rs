use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use miqat_core::{CalculationMethod, PrayerSchedule, PrayerTimes};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::CacheEntry;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Read-only view of the schedule cache, handed to countdown surfaces.
pub trait ScheduleReader: Send + Sync {
    /// Point lookup; absence is `Ok(None)`.
    fn get(&self, date: NaiveDate) -> Result<Option<CacheEntry>>;

    /// Entries with `from <= date <= to`, ascending by date.
    fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CacheEntry>>;
}

/// Full store contract. Only the schedule provider writes through it.
pub trait ScheduleStore: ScheduleReader {
    /// Upsert; replaces any entry already held for `date`.
    fn put(&self, date: NaiveDate, entry: &CacheEntry) -> Result<()>;

    /// Delete entries strictly older than `cutoff`, returning how many went.
    fn evict_before(&self, cutoff: NaiveDate) -> Result<usize>;

    fn clear(&self) -> Result<()>;
}

/// SQLite-backed store.
///
/// Wraps a single connection in a `Mutex`, so writes for a date are
/// serialised and a reader never sees a half-written row.
pub struct SqliteScheduleStore {
    db: Mutex<Connection>,
}

impl SqliteScheduleStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) a database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Throwaway database, dropped with the store.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ScheduleReader for SqliteScheduleStore {
    #[instrument(skip(self), fields(%date))]
    fn get(&self, date: NaiveDate) -> Result<Option<CacheEntry>> {
        let db = self.conn()?;
        let row = db.query_row(
            "SELECT date, fajr, dhuhr, asr, maghrib, isha, method, last_written
             FROM prayer_schedules WHERE date = ?1",
            [date.format(DATE_FORMAT).to_string()],
            RawRow::from_row,
        );
        match row {
            Ok(raw) => raw.into_entry().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                debug!("cache miss");
                Ok(None)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    #[instrument(skip(self), fields(%from, %to))]
    fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CacheEntry>> {
        let db = self.conn()?;
        let mut stmt = db.prepare_cached(
            "SELECT date, fajr, dhuhr, asr, maghrib, isha, method, last_written
             FROM prayer_schedules
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC",
        )?;
        let rows: Vec<RawRow> = stmt
            .query_map(
                [
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string(),
                ],
                RawRow::from_row,
            )?
            .collect::<rusqlite::Result<_>>()?;

        // A corrupt row must not hide the rest of the window.
        let entries = rows
            .into_iter()
            .filter_map(|raw| match raw.into_entry() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping cache row: {e}");
                    None
                }
            })
            .collect();
        Ok(entries)
    }
}

impl ScheduleStore for SqliteScheduleStore {
    #[instrument(skip(self, entry), fields(%date))]
    fn put(&self, date: NaiveDate, entry: &CacheEntry) -> Result<()> {
        let times = entry.schedule.times();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO prayer_schedules
             (date, fajr, dhuhr, asr, maghrib, isha, method, last_written)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(date) DO UPDATE SET
                fajr = excluded.fajr,
                dhuhr = excluded.dhuhr,
                asr = excluded.asr,
                maghrib = excluded.maghrib,
                isha = excluded.isha,
                method = excluded.method,
                last_written = excluded.last_written",
            rusqlite::params![
                date.format(DATE_FORMAT).to_string(),
                times.fajr.to_rfc3339(),
                times.dhuhr.to_rfc3339(),
                times.asr.to_rfc3339(),
                times.maghrib.to_rfc3339(),
                times.isha.to_rfc3339(),
                entry.schedule.method().as_str(),
                entry.last_written.to_rfc3339(),
            ],
        )?;
        debug!(method = %entry.schedule.method(), "cache entry written");
        Ok(())
    }

    #[instrument(skip(self), fields(%cutoff))]
    fn evict_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let db = self.conn()?;
        let n = db.execute(
            "DELETE FROM prayer_schedules WHERE date < ?1",
            [cutoff.format(DATE_FORMAT).to_string()],
        )?;
        if n > 0 {
            info!(count = n, "evicted expired schedules");
        }
        Ok(n)
    }

    fn clear(&self) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM prayer_schedules", [])?;
        info!(count = n, "schedule cache cleared");
        Ok(())
    }
}

/// Column values exactly as persisted, before validation.
struct RawRow {
    date: String,
    times: [String; 5],
    method: String,
    last_written: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            times: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
            method: row.get(6)?,
            last_written: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|e| {
            StoreError::Corrupt {
                date: NaiveDate::MIN,
                reason: format!("bad date {:?}: {e}", self.date),
            }
        })?;
        let corrupt = |reason: String| StoreError::Corrupt { date, reason };

        let [fajr, dhuhr, asr, maghrib, isha] = &self.times;
        let times = PrayerTimes {
            fajr: parse_instant(fajr).map_err(corrupt)?,
            dhuhr: parse_instant(dhuhr).map_err(corrupt)?,
            asr: parse_instant(asr).map_err(corrupt)?,
            maghrib: parse_instant(maghrib).map_err(corrupt)?,
            isha: parse_instant(isha).map_err(corrupt)?,
        };
        let method = CalculationMethod::from_str(&self.method).map_err(corrupt)?;
        let last_written = parse_instant(&self.last_written).map_err(corrupt)?;
        let schedule =
            PrayerSchedule::new(date, times, method).map_err(|e| corrupt(e.to_string()))?;

        Ok(CacheEntry::new(schedule, last_written))
    }
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad instant {s:?}: {e}"))
}
