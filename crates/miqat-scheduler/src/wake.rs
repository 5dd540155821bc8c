use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use miqat_core::clock::{local_hour, next_local_midnight};
use miqat_core::config::RefreshConfig;
use miqat_core::{PrayerKind, PrayerSchedule};
use serde::Serialize;

/// Tunables for wake planning.
#[derive(Debug, Clone)]
pub struct WakePolicy {
    pub pre_alert: Duration,
    pub periodic_interval: Duration,
    /// Local hour the active daypart starts (inclusive).
    pub active_start_hour: u32,
    /// Local hour the active daypart ends (exclusive).
    pub active_end_hour: u32,
}

impl Default for WakePolicy {
    fn default() -> Self {
        Self::from(&RefreshConfig::default())
    }
}

impl From<&RefreshConfig> for WakePolicy {
    fn from(cfg: &RefreshConfig) -> Self {
        Self {
            pre_alert: Duration::minutes(i64::from(cfg.pre_alert_mins)),
            periodic_interval: Duration::minutes(i64::from(cfg.periodic_interval_mins)),
            active_start_hour: cfg.active_start_hour,
            active_end_hour: cfg.active_end_hour,
        }
    }
}

impl WakePolicy {
    fn is_active(&self, hour: u32) -> bool {
        (self.active_start_hour..self.active_end_hour).contains(&hour)
    }
}

/// Why a wake was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "prayer", rename_all = "snake_case")]
pub enum WakeReason {
    /// The highlighted "next prayer" changes at this instant.
    PrayerTransition(PrayerKind),
    /// Lead time before a prayer.
    PreAlert(PrayerKind),
    /// A new calendar day needs its own schedule.
    Midnight,
    /// Fallback cadence during the active daypart.
    Periodic,
}

impl std::fmt::Display for WakeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WakeReason::PrayerTransition(kind) => write!(f, "transition:{}", kind.as_str()),
            WakeReason::PreAlert(kind) => write!(f, "pre_alert:{}", kind.as_str()),
            WakeReason::Midnight => write!(f, "midnight"),
            WakeReason::Periodic => write!(f, "periodic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WakePlan {
    pub at: DateTime<Utc>,
    pub reason: WakeReason,
}

/// Plan the next strategic wake.
///
/// `today` is the cached schedule for the local date of `now`, if any.
/// Candidates are evaluated in priority order and the first one strictly
/// after `now` is returned; the result is recomputed on every cycle.
pub fn next_wake(
    now: DateTime<Utc>,
    today: Option<&PrayerSchedule>,
    tz: Tz,
    policy: &WakePolicy,
) -> WakePlan {
    let next_prayer = today.and_then(|s| s.next_after(now));
    let midnight = next_local_midnight(now, tz);

    let candidates = [
        next_prayer.map(|(kind, at)| WakePlan {
            at,
            reason: WakeReason::PrayerTransition(kind),
        }),
        next_prayer.map(|(kind, at)| WakePlan {
            at: at - policy.pre_alert,
            reason: WakeReason::PreAlert(kind),
        }),
        midnight.map(|at| WakePlan {
            at,
            reason: WakeReason::Midnight,
        }),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|plan| plan.at > now)
        .unwrap_or_else(|| periodic_fallback(now, midnight, tz, policy))
}

fn periodic_fallback(
    now: DateTime<Utc>,
    midnight: Option<DateTime<Utc>>,
    tz: Tz,
    policy: &WakePolicy,
) -> WakePlan {
    match midnight {
        Some(at) if !policy.is_active(local_hour(now, tz)) && at > now => WakePlan {
            at,
            reason: WakeReason::Midnight,
        },
        _ => WakePlan {
            at: now + policy.periodic_interval,
            reason: WakeReason::Periodic,
        },
    }
}
