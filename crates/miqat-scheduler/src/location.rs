use miqat_core::Coordinate;
use serde::Serialize;

/// Outcome of feeding a coordinate to the [`LocationTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationChange {
    /// First valid fix.
    Initial,
    /// Moved at least the threshold distance away.
    Moved { distance_km: f64 },
    /// Within the threshold; not worth a recompute.
    Unchanged { distance_km: f64 },
    /// Out-of-range coordinate; ignored.
    Invalid,
}

impl LocationChange {
    /// Whether schedules should be recomputed for the new position.
    pub fn is_material(&self) -> bool {
        matches!(self, LocationChange::Initial | LocationChange::Moved { .. })
    }
}

/// Remembers the last accepted coordinate and filters out GPS jitter.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    threshold_km: f64,
    last: Option<Coordinate>,
}

impl LocationTracker {
    pub fn new(threshold_km: f64) -> Self {
        Self {
            threshold_km,
            last: None,
        }
    }

    /// Start from a known position, e.g. the configured one.
    pub fn with_known(threshold_km: f64, known: Coordinate) -> Self {
        Self {
            threshold_km,
            last: known.is_valid().then_some(known),
        }
    }

    pub fn last(&self) -> Option<Coordinate> {
        self.last
    }

    /// Classify `coordinate` against the last accepted one and accept it when
    /// the move is material. Small moves do not update the anchor, so slow
    /// drift still adds up to a material change eventually.
    pub fn observe(&mut self, coordinate: Coordinate) -> LocationChange {
        if !coordinate.is_valid() {
            return LocationChange::Invalid;
        }
        let Some(last) = self.last else {
            self.last = Some(coordinate);
            return LocationChange::Initial;
        };
        let distance_km = last.distance_km(&coordinate);
        if distance_km >= self.threshold_km {
            self.last = Some(coordinate);
            LocationChange::Moved { distance_km }
        } else {
            LocationChange::Unchanged { distance_km }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fix_is_initial() {
        let mut tracker = LocationTracker::new(1.0);
        assert_eq!(tracker.observe(Coordinate::new(21.42, 39.82)), LocationChange::Initial);
    }

    #[test]
    fn jitter_is_ignored_but_drift_accumulates() {
        let mut tracker = LocationTracker::with_known(1.0, Coordinate::new(0.0, 0.0));
        // ~0.55 km per step along the equator.
        assert!(!tracker.observe(Coordinate::new(0.0, 0.005)).is_material());
        assert!(tracker.observe(Coordinate::new(0.0, 0.010)).is_material());
        assert_eq!(tracker.last(), Some(Coordinate::new(0.0, 0.010)));
    }

    #[test]
    fn invalid_coordinates_do_not_move_the_anchor() {
        let home = Coordinate::new(51.5, -0.12);
        let mut tracker = LocationTracker::with_known(1.0, home);
        assert_eq!(tracker.observe(Coordinate::new(123.0, 0.0)), LocationChange::Invalid);
        assert_eq!(tracker.last(), Some(home));
    }

    #[test]
    fn invalid_known_position_is_dropped() {
        let tracker = LocationTracker::with_known(1.0, Coordinate::new(-91.0, 0.0));
        assert_eq!(tracker.last(), None);
    }
}
