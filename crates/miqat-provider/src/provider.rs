use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use dashmap::DashMap;
use miqat_core::config::{DEFAULT_CALCULATION_TIMEOUT_MS, DEFAULT_RETENTION_DAYS};
use miqat_core::{CalculationConfig, PrayerSchedule};
use miqat_store::{CacheEntry, ScheduleStore};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::calculator::AstronomicalCalculator;
use crate::error::{ProviderError, Result};

type Slot = Arc<OnceCell<Result<PrayerSchedule>>>;

/// Cache-or-compute front for the schedule store, and its only writer.
///
/// Lookups for one date share a single flight. Every calculate-and-store for
/// a date, lookup or forced recompute, runs under that date's write lock, so
/// at most one calculation per date is live and writes land in call order.
pub struct ScheduleProvider {
    store: Arc<dyn ScheduleStore>,
    calculator: Arc<dyn AstronomicalCalculator>,
    timeout: Duration,
    retention_days: u32,
    inflight: DashMap<NaiveDate, Slot>,
    write_locks: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl ScheduleProvider {
    pub fn new(store: Arc<dyn ScheduleStore>, calculator: Arc<dyn AstronomicalCalculator>) -> Self {
        Self {
            store,
            calculator,
            timeout: Duration::from_millis(DEFAULT_CALCULATION_TIMEOUT_MS),
            retention_days: DEFAULT_RETENTION_DAYS,
            inflight: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Schedule for `date`, from cache when present.
    ///
    /// A cached entry wins even when it was produced under a different
    /// config; use [`Self::recompute`] to replace it. On a miss the
    /// calculator runs at most once per date across all concurrent callers.
    #[instrument(skip(self, config), fields(%date))]
    pub async fn get_schedule(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerSchedule> {
        if let Some(entry) = self.store.get(date)? {
            debug!("schedule cache hit");
            return Ok(entry.schedule);
        }

        self.single_flight(date, || self.lookup_or_calculate(date, config))
            .await
    }

    /// Recalculate `date` under `config` and overwrite the cached entry.
    ///
    /// Waits for any calculation already running for `date`, then runs its
    /// own, so the cache ends up holding this config's result.
    #[instrument(skip(self, config), fields(%date))]
    pub async fn recompute(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerSchedule> {
        self.with_write_lock(date, || self.calculate_and_store(date, config))
            .await
    }

    /// Read-only point lookup for callers that must never trigger a calculation.
    pub fn cached(&self, date: NaiveDate) -> Result<Option<CacheEntry>> {
        Ok(self.store.get(date)?)
    }

    /// Drop entries older than the retention window ending at `today`.
    ///
    /// The cutoff day itself is kept.
    pub fn evict_expired(&self, today: NaiveDate) -> Result<usize> {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
            .unwrap_or(NaiveDate::MIN);
        let removed = self.store.evict_before(cutoff)?;
        debug!(%cutoff, removed, "retention pass complete");
        Ok(removed)
    }

    /// Run `compute` unless a lookup flight for `date` is already running, in
    /// which case wait for and share its outcome.
    async fn single_flight<F, Fut>(&self, date: NaiveDate, compute: F) -> Result<PrayerSchedule>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PrayerSchedule>>,
    {
        let slot: Slot = {
            let entry = self
                .inflight
                .entry(date)
                .or_insert_with(|| Arc::new(OnceCell::new()));
            Arc::clone(entry.value())
        };

        let outcome = slot.get_or_init(compute).await.clone();

        // Later callers start a fresh flight (and normally hit the cache).
        self.inflight
            .remove_if(&date, |_, current| Arc::ptr_eq(current, &slot));
        outcome
    }

    /// Run `work` while holding the write lock for `date`.
    async fn with_write_lock<F, Fut>(&self, date: NaiveDate, work: F) -> Result<PrayerSchedule>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PrayerSchedule>>,
    {
        let lock = Arc::clone(self.write_locks.entry(date).or_default().value());
        let outcome = {
            let _guard = lock.lock().await;
            work().await
        };
        drop(lock);
        // Only the map still holds it: nobody is waiting on this date.
        self.write_locks
            .remove_if(&date, |_, current| Arc::strong_count(current) == 1);
        outcome
    }

    async fn lookup_or_calculate(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerSchedule> {
        self.with_write_lock(date, || self.cached_or_calculate(date, config))
            .await
    }

    async fn cached_or_calculate(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerSchedule> {
        // A recompute (or an earlier flight) may have filled the cache
        // between our miss and taking the lock.
        if let Some(entry) = self.store.get(date)? {
            return Ok(entry.schedule);
        }
        self.calculate_and_store(date, config).await
    }

    async fn calculate_and_store(
        &self,
        date: NaiveDate,
        config: &CalculationConfig,
    ) -> Result<PrayerSchedule> {
        if !config.coordinate.is_valid() {
            warn!(coordinate = %config.coordinate, "rejecting invalid location");
            return Err(ProviderError::InvalidLocation(config.coordinate));
        }

        let started = Instant::now();
        let times = match tokio::time::timeout(
            self.timeout,
            self.calculator.calculate(date, config),
        )
        .await
        {
            Ok(Ok(times)) => times,
            Ok(Err(e)) => {
                warn!(calculator = self.calculator.name(), "calculation failed: {e}");
                return Err(ProviderError::CalculationFailed(e.to_string()));
            }
            Err(_) => {
                let ms = self.timeout.as_millis();
                warn!(calculator = self.calculator.name(), timeout_ms = %ms, "calculation timed out");
                return Err(ProviderError::CalculationFailed(format!(
                    "calculator timed out after {ms}ms"
                )));
            }
        };

        let schedule = PrayerSchedule::new(date, times, config.method)
            .map_err(|e| ProviderError::CalculationFailed(e.to_string()))?;
        self.store
            .put(date, &CacheEntry::new(schedule.clone(), Utc::now()))?;

        info!(
            method = %config.method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schedule calculated and cached"
        );
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use miqat_core::{CalculationMethod, Coordinate, Madhab, PrayerTimes};
    use miqat_store::{MemoryScheduleStore, ScheduleReader, StoreError};

    use crate::calculator::CalculatorError;

    /// Fake calculator that counts calls and can be slowed down or broken.
    #[derive(Default)]
    struct CountingCalculator {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Option<Duration>,
        /// Overrides `delay` for one method.
        slow_method: Option<(CalculationMethod, Duration)>,
        fail: bool,
        out_of_order: bool,
    }

    impl CountingCalculator {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Most calculations ever running at once.
        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AstronomicalCalculator for CountingCalculator {
        fn name(&self) -> &str {
            "counting"
        }

        async fn calculate(
            &self,
            date: NaiveDate,
            config: &CalculationConfig,
        ) -> std::result::Result<PrayerTimes, CalculatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            let delay = match self.slow_method {
                Some((method, slow)) if method == config.method => Some(slow),
                _ => self.delay,
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(CalculatorError::Other("sun refused to set".into()));
            }
            let at = |h, m| {
                Utc.from_utc_datetime(&date.and_hms_opt(h, m, 0).unwrap())
            };
            let mut times = PrayerTimes {
                fajr: at(5, 12),
                dhuhr: at(12, 8),
                asr: at(15, 31),
                maghrib: at(17, 46),
                isha: at(19, 10),
            };
            if self.out_of_order {
                times.isha = at(4, 0);
            }
            Ok(times)
        }
    }

    /// Store whose every operation fails, for error propagation checks.
    struct BrokenStore;

    impl ScheduleReader for BrokenStore {
        fn get(&self, _date: NaiveDate) -> miqat_store::Result<Option<CacheEntry>> {
            Err(StoreError::LockPoisoned)
        }
        fn range(&self, _from: NaiveDate, _to: NaiveDate) -> miqat_store::Result<Vec<CacheEntry>> {
            Err(StoreError::LockPoisoned)
        }
    }

    impl ScheduleStore for BrokenStore {
        fn put(&self, _date: NaiveDate, _entry: &CacheEntry) -> miqat_store::Result<()> {
            Err(StoreError::LockPoisoned)
        }
        fn evict_before(&self, _cutoff: NaiveDate) -> miqat_store::Result<usize> {
            Err(StoreError::LockPoisoned)
        }
        fn clear(&self) -> miqat_store::Result<()> {
            Err(StoreError::LockPoisoned)
        }
    }

    fn config(method: CalculationMethod) -> CalculationConfig {
        CalculationConfig::new(
            method,
            Madhab::Shafi,
            Coordinate::new(21.4225, 39.8262),
            Tz::UTC,
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn setup(calc: CountingCalculator) -> (Arc<MemoryScheduleStore>, Arc<CountingCalculator>, ScheduleProvider) {
        let store = Arc::new(MemoryScheduleStore::new());
        let calc = Arc::new(calc);
        let provider = ScheduleProvider::new(store.clone(), calc.clone());
        (store, calc, provider)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (store, calc, provider) = setup(CountingCalculator::default());
        let cfg = config(CalculationMethod::UmmAlQura);

        let first = provider.get_schedule(day(15), &cfg).await.unwrap();
        let second = provider.get_schedule(day(15), &cfg).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calc.calls(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_ignores_changed_config() {
        let (_store, calc, provider) = setup(CountingCalculator::default());
        provider
            .get_schedule(day(15), &config(CalculationMethod::UmmAlQura))
            .await
            .unwrap();
        let again = provider
            .get_schedule(day(15), &config(CalculationMethod::Karachi))
            .await
            .unwrap();

        assert_eq!(again.method(), CalculationMethod::UmmAlQura);
        assert_eq!(calc.calls(), 1);
    }

    #[tokio::test]
    async fn recompute_overwrites_entry() {
        let (store, calc, provider) = setup(CountingCalculator::default());
        provider
            .get_schedule(day(15), &config(CalculationMethod::UmmAlQura))
            .await
            .unwrap();
        let fresh = provider
            .recompute(day(15), &config(CalculationMethod::Karachi))
            .await
            .unwrap();

        assert_eq!(fresh.method(), CalculationMethod::Karachi);
        assert_eq!(calc.calls(), 2);
        let cached = store.get(day(15)).unwrap().unwrap();
        assert_eq!(cached.schedule.method(), CalculationMethod::Karachi);
    }

    #[tokio::test]
    async fn invalid_location_skips_calculator_and_cache() {
        let (store, calc, provider) = setup(CountingCalculator::default());
        let cfg = config(CalculationMethod::Egyptian).with_coordinate(Coordinate::new(95.0, 10.0));

        let err = provider.get_schedule(day(15), &cfg).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidLocation(_)));
        assert!(!err.is_retryable());
        assert_eq!(calc.calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn calculator_failure_is_surfaced_without_write() {
        let (store, _calc, provider) = setup(CountingCalculator {
            fail: true,
            ..Default::default()
        });
        let err = provider
            .get_schedule(day(15), &config(CalculationMethod::Egyptian))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CALCULATION_FAILED");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn out_of_order_result_is_rejected() {
        let (store, _calc, provider) = setup(CountingCalculator {
            out_of_order: true,
            ..Default::default()
        });
        let err = provider
            .get_schedule(day(15), &config(CalculationMethod::Tehran))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::CalculationFailed(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn slow_calculator_times_out() {
        let store = Arc::new(MemoryScheduleStore::new());
        let calc = Arc::new(CountingCalculator {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let provider =
            ScheduleProvider::new(store.clone(), calc).with_timeout(Duration::from_millis(20));

        let err = provider
            .get_schedule(day(15), &config(CalculationMethod::Dubai))
            .await
            .unwrap_err();

        match err {
            ProviderError::CalculationFailed(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected CalculationFailed, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_failure_becomes_cache_error() {
        let provider = ScheduleProvider::new(
            Arc::new(BrokenStore),
            Arc::new(CountingCalculator::default()),
        );
        let err = provider
            .get_schedule(day(15), &config(CalculationMethod::Qatar))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CacheError(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_calculation() {
        let (store, calc, provider) = setup(CountingCalculator {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let provider = Arc::new(provider);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    provider
                        .get_schedule(day(15), &config(CalculationMethod::Singapore))
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }

        assert_eq!(calc.calls(), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
        assert!(provider.inflight.is_empty());
        assert!(provider.write_locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_failure() {
        let (_store, calc, provider) = setup(CountingCalculator {
            delay: Some(Duration::from_millis(50)),
            fail: true,
            ..Default::default()
        });
        let provider = Arc::new(provider);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    provider
                        .get_schedule(day(15), &config(CalculationMethod::Turkey))
                        .await
                })
            })
            .collect();

        let mut errors = Vec::new();
        for h in handles {
            errors.push(h.await.unwrap().unwrap_err());
        }

        assert_eq!(calc.calls(), 1);
        assert!(errors.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recompute_waits_for_running_lookup() {
        let (store, calc, provider) = setup(CountingCalculator {
            delay: Some(Duration::from_millis(10)),
            slow_method: Some((CalculationMethod::UmmAlQura, Duration::from_millis(200))),
            ..Default::default()
        });
        let provider = Arc::new(provider);

        let lookup = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                provider
                    .get_schedule(day(15), &config(CalculationMethod::UmmAlQura))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = provider
            .recompute(day(15), &config(CalculationMethod::Karachi))
            .await
            .unwrap();
        let first = lookup.await.unwrap().unwrap();

        assert_eq!(first.method(), CalculationMethod::UmmAlQura);
        assert_eq!(fresh.method(), CalculationMethod::Karachi);
        assert_eq!(calc.calls(), 2);
        assert_eq!(calc.peak(), 1);
        let cached = store.get(day(15)).unwrap().unwrap();
        assert_eq!(cached.schedule.method(), CalculationMethod::Karachi);
        assert!(provider.write_locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lookup_during_recompute_takes_its_result() {
        let (store, calc, provider) = setup(CountingCalculator {
            slow_method: Some((CalculationMethod::Karachi, Duration::from_millis(200))),
            ..Default::default()
        });
        let provider = Arc::new(provider);

        let recompute = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                provider
                    .recompute(day(15), &config(CalculationMethod::Karachi))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let looked_up = provider
            .get_schedule(day(15), &config(CalculationMethod::UmmAlQura))
            .await
            .unwrap();
        recompute.await.unwrap().unwrap();

        assert_eq!(looked_up.method(), CalculationMethod::Karachi);
        assert_eq!(calc.calls(), 1);
        let cached = store.get(day(15)).unwrap().unwrap();
        assert_eq!(cached.schedule.method(), CalculationMethod::Karachi);
    }

    #[tokio::test]
    async fn failed_flight_can_be_retried() {
        let (_store, calc, provider) = setup(CountingCalculator {
            fail: true,
            ..Default::default()
        });
        let cfg = config(CalculationMethod::Kuwait);
        assert!(provider.get_schedule(day(15), &cfg).await.is_err());
        assert!(provider.get_schedule(day(15), &cfg).await.is_err());
        assert_eq!(calc.calls(), 2);
    }

    #[tokio::test]
    async fn evict_expired_keeps_cutoff_day() {
        let (store, _calc, provider) = setup(CountingCalculator::default());
        let cfg = config(CalculationMethod::MuslimWorldLeague);
        let today = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        // 2024-01-15 is exactly 30 days before 2024-02-14.
        for d in [14, 15, 16] {
            provider.get_schedule(day(d), &cfg).await.unwrap();
        }

        assert_eq!(provider.evict_expired(today).unwrap(), 1);
        assert!(store.get(day(14)).unwrap().is_none());
        assert!(store.get(day(15)).unwrap().is_some());
        assert!(store.get(day(16)).unwrap().is_some());
    }
}
