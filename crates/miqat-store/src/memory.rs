use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use crate::error::{Result, StoreError};
use crate::store::{ScheduleReader, ScheduleStore};
use crate::types::CacheEntry;

/// In-process store used by tests and previews. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryScheduleStore {
    entries: RwLock<BTreeMap<NaiveDate, CacheEntry>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScheduleReader for MemoryScheduleStore {
    fn get(&self, date: NaiveDate) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(&date).cloned())
    }

    fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CacheEntry>> {
        if from > to {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.range(from..=to).map(|(_, e)| e.clone()).collect())
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn put(&self, date: NaiveDate, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(date, entry.clone());
        Ok(())
    }

    fn evict_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let kept = entries.split_off(&cutoff);
        let removed = entries.len();
        *entries = kept;
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }
}
