use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{MiqatError, Result};
use crate::types::{CalculationConfig, CalculationMethod, Coordinate, Madhab};

pub const DEFAULT_PRELOAD_DAYS: u32 = 7;
pub const DEFAULT_PERIODIC_INTERVAL_MINS: u32 = 15;
pub const DEFAULT_ACTIVE_START_HOUR: u32 = 5;
pub const DEFAULT_ACTIVE_END_HOUR: u32 = 23;
pub const DEFAULT_PRE_ALERT_MINS: u32 = 5;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_LOCATION_THRESHOLD_KM: f64 = 1.0;
pub const DEFAULT_CALCULATION_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_TIMELINE_MAX_ENTRIES: usize = 48;

/// Top-level config (miqat.toml + MIQAT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiqatConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub calculation: CalculationSettings,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub calculator: CalculatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// User-facing calculation settings. The time zone is an IANA name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationSettings {
    #[serde(default = "default_method")]
    pub method: CalculationMethod,
    #[serde(default)]
    pub madhab: Madhab,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            method: default_method(),
            madhab: Madhab::default(),
            latitude: 0.0,
            longitude: 0.0,
            time_zone: default_time_zone(),
        }
    }
}

impl CalculationSettings {
    /// Resolve the settings into the immutable value handed to the provider.
    pub fn to_calculation_config(&self) -> Result<CalculationConfig> {
        let tz: Tz = self
            .time_zone
            .parse()
            .map_err(|_| MiqatError::UnknownTimeZone(self.time_zone.clone()))?;
        Ok(CalculationConfig::new(
            self.method,
            self.madhab,
            Coordinate::new(self.latitude, self.longitude),
            tz,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Upper bound for a single calculator call; exceeding it counts as a failure.
    #[serde(default = "default_calculation_timeout_ms")]
    pub calculation_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            calculation_timeout_ms: DEFAULT_CALCULATION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_preload_days")]
    pub preload_days: u32,
    #[serde(default = "default_periodic_interval_mins")]
    pub periodic_interval_mins: u32,
    /// Local hour (inclusive) at which the active daypart starts.
    #[serde(default = "default_active_start_hour")]
    pub active_start_hour: u32,
    /// Local hour (exclusive) at which the active daypart ends.
    #[serde(default = "default_active_end_hour")]
    pub active_end_hour: u32,
    #[serde(default = "default_pre_alert_mins")]
    pub pre_alert_mins: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Moves shorter than this are ignored by the location tracker.
    #[serde(default = "default_location_threshold_km")]
    pub location_threshold_km: f64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            preload_days: DEFAULT_PRELOAD_DAYS,
            periodic_interval_mins: DEFAULT_PERIODIC_INTERVAL_MINS,
            active_start_hour: DEFAULT_ACTIVE_START_HOUR,
            active_end_hour: DEFAULT_ACTIVE_END_HOUR,
            pre_alert_mins: DEFAULT_PRE_ALERT_MINS,
            retention_days: DEFAULT_RETENTION_DAYS,
            location_threshold_km: DEFAULT_LOCATION_THRESHOLD_KM,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_timeline_max_entries")]
    pub max_entries: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_TIMELINE_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorConfig {
    /// Published timetable (TOML) served by the built-in calculator.
    #[serde(default = "default_timetable_path")]
    pub timetable_path: String,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            timetable_path: default_timetable_path(),
        }
    }
}

fn default_method() -> CalculationMethod {
    CalculationMethod::MuslimWorldLeague
}
fn default_time_zone() -> String {
    "UTC".to_string()
}
fn default_calculation_timeout_ms() -> u64 {
    DEFAULT_CALCULATION_TIMEOUT_MS
}
fn default_preload_days() -> u32 {
    DEFAULT_PRELOAD_DAYS
}
fn default_periodic_interval_mins() -> u32 {
    DEFAULT_PERIODIC_INTERVAL_MINS
}
fn default_active_start_hour() -> u32 {
    DEFAULT_ACTIVE_START_HOUR
}
fn default_active_end_hour() -> u32 {
    DEFAULT_ACTIVE_END_HOUR
}
fn default_pre_alert_mins() -> u32 {
    DEFAULT_PRE_ALERT_MINS
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_location_threshold_km() -> f64 {
    DEFAULT_LOCATION_THRESHOLD_KM
}
fn default_timeline_max_entries() -> usize {
    DEFAULT_TIMELINE_MAX_ENTRIES
}
fn default_db_path() -> String {
    format!("{}/miqat.db", miqat_home())
}
fn default_timetable_path() -> String {
    format!("{}/timetable.toml", miqat_home())
}

fn miqat_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.miqat")
}

impl MiqatConfig {
    /// Load config from a TOML file with MIQAT_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `MIQAT_REFRESH__PRELOAD_DAYS=3`.
    /// Without an explicit path, `~/.miqat/miqat.toml` is read.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MIQAT_").split("__"))
            .extract()
            .map_err(|e| MiqatError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    format!("{}/miqat.toml", miqat_home())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_refresh_policy() {
        let cfg = MiqatConfig::default();
        assert_eq!(cfg.refresh.preload_days, 7);
        assert_eq!(cfg.refresh.periodic_interval_mins, 15);
        assert_eq!(cfg.refresh.retention_days, 30);
        assert_eq!(cfg.refresh.active_start_hour, 5);
        assert_eq!(cfg.refresh.active_end_hour, 23);
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("miqat.toml");
        std::fs::write(
            &path,
            r#"
            [calculation]
            method = "egyptian"
            madhab = "hanafi"
            latitude = 30.0444
            longitude = 31.2357
            time_zone = "Africa/Cairo"

            [refresh]
            preload_days = 3
            "#,
        )
        .unwrap();

        let cfg = MiqatConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.refresh.preload_days, 3);
        assert_eq!(cfg.refresh.retention_days, 30);

        let calc = cfg.calculation.to_calculation_config().unwrap();
        assert_eq!(calc.method, CalculationMethod::Egyptian);
        assert_eq!(calc.madhab, Madhab::Hanafi);
        assert_eq!(calc.time_zone, chrono_tz::Africa::Cairo);
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let settings = CalculationSettings {
            time_zone: "Mars/Olympus_Mons".to_string(),
            ..CalculationSettings::default()
        };
        let err = settings.to_calculation_config().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_TIME_ZONE");
    }
}
