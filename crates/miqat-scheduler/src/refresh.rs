use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Days, NaiveDate, Utc};
use miqat_core::clock::local_date;
use miqat_core::config::RefreshConfig;
use miqat_core::{CalculationConfig, Coordinate};
use miqat_provider::{ProviderError, ScheduleProvider};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::jobs::BackgroundJobs;
use crate::location::{LocationChange, LocationTracker};
use crate::wake::{next_wake, WakePlan, WakePolicy, WakeReason};

/// Outcome of a preload or targeted refresh. Partial success is normal.
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, ProviderError)>,
    /// Stopped early because the cycle was cancelled or superseded.
    pub cancelled: bool,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// What [`RefreshScheduler::on_foreground`] decided to do.
#[derive(Debug)]
pub enum ForegroundAction {
    /// Today was missing, or older than the refresh window; the preload
    /// window was filled.
    Preloaded(PreloadReport),
    /// Today was stale; today and tomorrow were recomputed.
    Refreshed(PreloadReport),
    UpToDate,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Cache-or-compute.
    Lookup,
    /// Overwrite whatever is cached.
    Recompute,
}

/// Drives wake planning, rolling preloads and location corrections.
///
/// Only reads the cache directly; every write goes through the provider.
pub struct RefreshScheduler {
    provider: Arc<ScheduleProvider>,
    jobs: Arc<dyn BackgroundJobs>,
    config: RwLock<CalculationConfig>,
    tracker: Mutex<LocationTracker>,
    policy: WakePolicy,
    preload_days: u32,
}

impl RefreshScheduler {
    pub fn new(
        provider: Arc<ScheduleProvider>,
        jobs: Arc<dyn BackgroundJobs>,
        config: CalculationConfig,
        refresh: &RefreshConfig,
    ) -> Self {
        let tracker = LocationTracker::with_known(refresh.location_threshold_km, config.coordinate);
        Self {
            provider,
            jobs,
            config: RwLock::new(config),
            tracker: Mutex::new(tracker),
            policy: WakePolicy::from(refresh),
            preload_days: refresh.preload_days,
        }
    }

    /// Snapshot of the config currently used for calculations.
    pub fn config(&self) -> Result<CalculationConfig> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| SchedulerError::Poisoned("config"))
    }

    /// Load `days` consecutive days starting at `today` through the provider.
    ///
    /// A failing day is logged and skipped. `cancel` is checked before each
    /// day; a calculation already running is allowed to finish.
    pub async fn preload_upcoming(
        &self,
        today: NaiveDate,
        days: u32,
        cancel: &CancellationToken,
    ) -> PreloadReport {
        let config = match self.config() {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("preload aborted: {e}");
                return PreloadReport {
                    cancelled: true,
                    ..Default::default()
                };
            }
        };
        let dates: Vec<NaiveDate> = (0..u64::from(days))
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .collect();

        let report = self.refresh_dates(&dates, Mode::Lookup, &config, cancel).await;
        info!(
            %today,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "preload finished"
        );
        report
    }

    /// React to a new position. Material moves update the config and
    /// recompute today and tomorrow only.
    pub async fn on_location_change(
        &self,
        coordinate: Coordinate,
        now: DateTime<Utc>,
    ) -> Result<(LocationChange, PreloadReport)> {
        let change = self
            .tracker
            .lock()
            .map_err(|_| SchedulerError::Poisoned("location tracker"))?
            .observe(coordinate);

        if !change.is_material() {
            debug!(%coordinate, ?change, "location change ignored");
            return Ok((change, PreloadReport::default()));
        }

        let config = {
            let mut cfg = self
                .config
                .write()
                .map_err(|_| SchedulerError::Poisoned("config"))?;
            *cfg = cfg.with_coordinate(coordinate);
            cfg.clone()
        };

        info!(%coordinate, ?change, "location changed; refreshing today and tomorrow");
        let report = self
            .refresh_near_term(now, &config, &CancellationToken::new())
            .await;
        Ok((change, report))
    }

    /// Second line of defence for missed wakes, run when the app comes back.
    pub async fn on_foreground(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ForegroundAction> {
        let config = self.config()?;
        let today = local_date(now, config.time_zone);

        match self.provider.cached(today)? {
            None => {
                info!(%today, "no schedule for today; preloading");
                let report = self.preload_upcoming(today, self.preload_days, cancel).await;
                Ok(ForegroundAction::Preloaded(report))
            }
            Some(entry) if entry.is_stale(now) => {
                info!(%today, last_written = %entry.last_written, "today's schedule is stale");
                let report = self.refresh_near_term(now, &config, cancel).await;
                Ok(ForegroundAction::Refreshed(report))
            }
            Some(entry) if entry.needs_refresh(now) => {
                debug!(%today, last_written = %entry.last_written, "topping up preload window");
                let report = self.preload_upcoming(today, self.preload_days, cancel).await;
                Ok(ForegroundAction::Preloaded(report))
            }
            Some(_) => Ok(ForegroundAction::UpToDate),
        }
    }

    /// Plan the next wake from whatever is cached for today.
    pub fn plan_next_wake(&self, now: DateTime<Utc>) -> Result<WakePlan> {
        let config = self.config()?;
        let today = local_date(now, config.time_zone);
        let schedule = self.provider.cached(today)?.map(|entry| entry.schedule);
        Ok(next_wake(now, schedule.as_ref(), config.time_zone, &self.policy))
    }

    /// One strategic wake: preload, apply retention, plan and request the
    /// next wake, then signal completion.
    pub async fn on_wake(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<WakePlan> {
        let tz = self.config()?.time_zone;
        let today = local_date(now, tz);

        let report = self.preload_upcoming(today, self.preload_days, cancel).await;
        if let Err(e) = self.provider.evict_expired(today) {
            warn!("retention pass failed: {e}");
        }

        let plan = self.plan_next_wake(now);
        match &plan {
            Ok(p) => self.jobs.request_wake(p.at, p.reason),
            Err(e) => error!("could not plan next wake: {e}"),
        }
        self.jobs.complete(report.is_complete() && plan.is_ok());
        plan
    }

    /// Main loop. Runs a wake cycle, then sleeps until the planned instant,
    /// reacting to location updates, until `shutdown` is cancelled.
    ///
    /// A location update that arrives mid-cycle supersedes the cycle: the
    /// preload stops before its next day and the location is handled first.
    pub async fn run(
        self: Arc<Self>,
        mut locations: watch::Receiver<Option<Coordinate>>,
        shutdown: CancellationToken,
    ) {
        info!("refresh scheduler started");
        let mut locations_open = true;

        loop {
            let cycle = shutdown.child_token();
            let mut pending = None;
            let outcome = {
                let work = self.on_wake(Utc::now(), &cycle);
                tokio::pin!(work);
                loop {
                    tokio::select! {
                        outcome = &mut work => break outcome,
                        changed = locations.changed(), if locations_open && !cycle.is_cancelled() => {
                            match changed {
                                Ok(()) => {
                                    pending = *locations.borrow_and_update();
                                    cycle.cancel();
                                }
                                Err(_) => locations_open = false,
                            }
                        }
                    }
                }
            };

            if shutdown.is_cancelled() {
                break;
            }

            let mut plan = outcome.unwrap_or_else(|e| {
                error!("wake cycle failed: {e}");
                self.retry_plan(Utc::now())
            });
            if let Some(coordinate) = pending {
                plan = self.handle_location(coordinate).await;
            }

            // Idle until the planned wake.
            loop {
                let sleep = (plan.at - Utc::now()).to_std().unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(sleep) => break,
                    changed = locations.changed(), if locations_open => {
                        match changed {
                            Ok(()) => {
                                let latest = *locations.borrow_and_update();
                                if let Some(coordinate) = latest {
                                    plan = self.handle_location(coordinate).await;
                                }
                            }
                            Err(_) => {
                                debug!("location feed closed");
                                locations_open = false;
                            }
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }

            if shutdown.is_cancelled() {
                break;
            }
        }
        info!("refresh scheduler shutting down");
    }

    // --- private helpers ---------------------------------------------------

    async fn handle_location(&self, coordinate: Coordinate) -> WakePlan {
        let now = Utc::now();
        if let Err(e) = self.on_location_change(coordinate, now).await {
            error!("location update failed: {e}");
        }
        match self.plan_next_wake(now) {
            Ok(plan) => {
                self.jobs.request_wake(plan.at, plan.reason);
                plan
            }
            Err(e) => {
                error!("could not plan next wake: {e}");
                self.retry_plan(now)
            }
        }
    }

    fn retry_plan(&self, now: DateTime<Utc>) -> WakePlan {
        WakePlan {
            at: now + self.policy.periodic_interval,
            reason: WakeReason::Periodic,
        }
    }

    async fn refresh_near_term(
        &self,
        now: DateTime<Utc>,
        config: &CalculationConfig,
        cancel: &CancellationToken,
    ) -> PreloadReport {
        let today = local_date(now, config.time_zone);
        let dates: Vec<NaiveDate> = [Some(today), today.succ_opt()].into_iter().flatten().collect();
        self.refresh_dates(&dates, Mode::Recompute, config, cancel).await
    }

    async fn refresh_dates(
        &self,
        dates: &[NaiveDate],
        mode: Mode,
        config: &CalculationConfig,
        cancel: &CancellationToken,
    ) -> PreloadReport {
        let mut report = PreloadReport::default();
        for &date in dates {
            if cancel.is_cancelled() {
                debug!(%date, "refresh cancelled before next day");
                report.cancelled = true;
                break;
            }
            let outcome = match mode {
                Mode::Lookup => self.provider.get_schedule(date, config).await,
                Mode::Recompute => self.provider.recompute(date, config).await,
            };
            match outcome {
                Ok(_) => report.loaded.push(date),
                Err(e) => {
                    warn!(%date, code = e.code(), "skipping day: {e}");
                    report.failed.push((date, e));
                }
            }
        }
        report
    }
}
