use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use miqat_core::{CalculationConfig, MiqatConfig};
use miqat_provider::{ScheduleProvider, TimetableCalculator};
use miqat_scheduler::{BackgroundJobs, LoggingJobs, RefreshScheduler};
use miqat_store::SqliteScheduleStore;
use miqat_timeline::{CountdownState, TimelineGenerator};
use tracing::info;

/// Everything the subcommands need, wired once at startup.
pub struct App {
    pub config: MiqatConfig,
    pub calculation: CalculationConfig,
    pub store: Arc<SqliteScheduleStore>,
    pub provider: Arc<ScheduleProvider>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl App {
    pub fn build(config: MiqatConfig) -> anyhow::Result<Self> {
        Self::build_with_jobs(config, Arc::new(LoggingJobs))
    }

    pub fn build_with_jobs(
        config: MiqatConfig,
        jobs: Arc<dyn BackgroundJobs>,
    ) -> anyhow::Result<Self> {
        let calculation = config
            .calculation
            .to_calculation_config()
            .context("invalid calculation settings")?;

        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening schedule cache");
        let store = Arc::new(SqliteScheduleStore::open(db_path)?);

        let calculator = Arc::new(
            TimetableCalculator::load(&config.calculator.timetable_path)
                .context("loading timetable")?,
        );
        let provider = Arc::new(
            ScheduleProvider::new(store.clone(), calculator)
                .with_timeout(Duration::from_millis(config.provider.calculation_timeout_ms))
                .with_retention_days(config.refresh.retention_days),
        );
        let scheduler = Arc::new(RefreshScheduler::new(
            provider.clone(),
            jobs,
            calculation.clone(),
            &config.refresh,
        ));

        Ok(Self {
            config,
            calculation,
            store,
            provider,
            scheduler,
        })
    }

    /// Countdown state from cache lookups only; never calculates.
    pub fn countdown(&self, now: DateTime<Utc>, max_entries: Option<usize>) -> CountdownState {
        let tz = self.calculation.time_zone;
        let generator = match max_entries {
            Some(max) => TimelineGenerator::new(tz, max),
            None => TimelineGenerator::from_config(&self.config.timeline, tz),
        };
        CountdownState::load(self.store.as_ref(), &generator, now)
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
