use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{MiqatError, Result};

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// The five daily prayers, in their fixed temporal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrayerKind {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerKind {
    /// All kinds in day order. Iteration order is part of the contract.
    pub const ALL: [PrayerKind; 5] = [
        PrayerKind::Fajr,
        PrayerKind::Dhuhr,
        PrayerKind::Asr,
        PrayerKind::Maghrib,
        PrayerKind::Isha,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerKind::Fajr => "fajr",
            PrayerKind::Dhuhr => "dhuhr",
            PrayerKind::Asr => "asr",
            PrayerKind::Maghrib => "maghrib",
            PrayerKind::Isha => "isha",
        }
    }
}

impl std::fmt::Display for PrayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrayerKind::Fajr => "Fajr",
            PrayerKind::Dhuhr => "Dhuhr",
            PrayerKind::Asr => "Asr",
            PrayerKind::Maghrib => "Maghrib",
            PrayerKind::Isha => "Isha",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PrayerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fajr" => Ok(PrayerKind::Fajr),
            "dhuhr" => Ok(PrayerKind::Dhuhr),
            "asr" => Ok(PrayerKind::Asr),
            "maghrib" => Ok(PrayerKind::Maghrib),
            "isha" => Ok(PrayerKind::Isha),
            other => Err(format!("unknown prayer: {other}")),
        }
    }
}

/// Astronomical convention used to derive Fajr and Isha angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    MuslimWorldLeague,
    Egyptian,
    Karachi,
    UmmAlQura,
    Dubai,
    MoonsightingCommittee,
    NorthAmerica,
    Kuwait,
    Qatar,
    Singapore,
    Tehran,
    Turkey,
    Other,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::MuslimWorldLeague => "muslim_world_league",
            CalculationMethod::Egyptian => "egyptian",
            CalculationMethod::Karachi => "karachi",
            CalculationMethod::UmmAlQura => "umm_al_qura",
            CalculationMethod::Dubai => "dubai",
            CalculationMethod::MoonsightingCommittee => "moonsighting_committee",
            CalculationMethod::NorthAmerica => "north_america",
            CalculationMethod::Kuwait => "kuwait",
            CalculationMethod::Qatar => "qatar",
            CalculationMethod::Singapore => "singapore",
            CalculationMethod::Tehran => "tehran",
            CalculationMethod::Turkey => "turkey",
            CalculationMethod::Other => "other",
        }
    }
}

impl std::fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CalculationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "muslim_world_league" => Ok(CalculationMethod::MuslimWorldLeague),
            "egyptian" => Ok(CalculationMethod::Egyptian),
            "karachi" => Ok(CalculationMethod::Karachi),
            "umm_al_qura" => Ok(CalculationMethod::UmmAlQura),
            "dubai" => Ok(CalculationMethod::Dubai),
            "moonsighting_committee" => Ok(CalculationMethod::MoonsightingCommittee),
            "north_america" => Ok(CalculationMethod::NorthAmerica),
            "kuwait" => Ok(CalculationMethod::Kuwait),
            "qatar" => Ok(CalculationMethod::Qatar),
            "singapore" => Ok(CalculationMethod::Singapore),
            "tehran" => Ok(CalculationMethod::Tehran),
            "turkey" => Ok(CalculationMethod::Turkey),
            "other" => Ok(CalculationMethod::Other),
            other => Err(format!("unknown calculation method: {other}")),
        }
    }
}

/// Jurisprudential variant. Only the Asr instant depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Madhab {
    /// Shadow length equal to object height (Shafi'i, Maliki, Hanbali).
    #[default]
    Shafi,
    /// Shadow length twice the object height.
    Hanafi,
}

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True for finite coordinates within -90..=90 latitude and -180..=180 longitude.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle (haversine) distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

/// Everything the calculator needs besides the date.
///
/// Schedules computed under different configs are not interchangeable, but the
/// cache keeps only the most recent one per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationConfig {
    pub method: CalculationMethod,
    #[serde(default)]
    pub madhab: Madhab,
    pub coordinate: Coordinate,
    pub time_zone: Tz,
}

impl CalculationConfig {
    pub fn new(
        method: CalculationMethod,
        madhab: Madhab,
        coordinate: Coordinate,
        time_zone: Tz,
    ) -> Self {
        Self {
            method,
            madhab,
            coordinate,
            time_zone,
        }
    }

    /// Same config at a different location.
    pub fn with_coordinate(&self, coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            ..self.clone()
        }
    }
}

/// The five instants of one day, as returned by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimes {
    pub fajr: DateTime<Utc>,
    pub dhuhr: DateTime<Utc>,
    pub asr: DateTime<Utc>,
    pub maghrib: DateTime<Utc>,
    pub isha: DateTime<Utc>,
}

impl PrayerTimes {
    pub fn get(&self, kind: PrayerKind) -> DateTime<Utc> {
        match kind {
            PrayerKind::Fajr => self.fajr,
            PrayerKind::Dhuhr => self.dhuhr,
            PrayerKind::Asr => self.asr,
            PrayerKind::Maghrib => self.maghrib,
            PrayerKind::Isha => self.isha,
        }
    }

    /// Pairs of (kind, instant) in day order.
    pub fn iter(&self) -> impl Iterator<Item = (PrayerKind, DateTime<Utc>)> + '_ {
        PrayerKind::ALL.into_iter().map(|k| (k, self.get(k)))
    }
}

/// A validated daily schedule. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrayerSchedule {
    date: NaiveDate,
    times: PrayerTimes,
    method: CalculationMethod,
}

impl PrayerSchedule {
    /// Build a schedule, rejecting instants that do not strictly increase in
    /// prayer order. Polar latitudes can make calculators return such days.
    pub fn new(date: NaiveDate, times: PrayerTimes, method: CalculationMethod) -> Result<Self> {
        for pair in PrayerKind::ALL.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if times.get(earlier) >= times.get(later) {
                return Err(MiqatError::OutOfOrder {
                    date,
                    earlier,
                    later,
                });
            }
        }
        Ok(Self {
            date,
            times,
            method,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn times(&self) -> &PrayerTimes {
        &self.times
    }

    pub fn method(&self) -> CalculationMethod {
        self.method
    }

    pub fn time(&self, kind: PrayerKind) -> DateTime<Utc> {
        self.times.get(kind)
    }

    /// First prayer strictly after `instant`, if any remains on this day.
    pub fn next_after(&self, instant: DateTime<Utc>) -> Option<(PrayerKind, DateTime<Utc>)> {
        self.times.iter().find(|(_, at)| *at > instant)
    }

    /// True once every prayer of the day is at or before `now`.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.next_after(now).is_none()
    }
}
