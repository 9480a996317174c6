#![forbid(unsafe_code)]

/// Ascent and descent summed over deltas between consecutive altitude
/// samples. A delta smaller than the threshold is sensor drift and is left
/// out of both totals.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationTracker {
    threshold_m: f64,
    previous_m: Option<f64>,
    ascent_m: f64,
    descent_m: f64,
}

impl ElevationTracker {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m: threshold_m.max(0.0),
            previous_m: None,
            ascent_m: 0.0,
            descent_m: 0.0,
        }
    }

    pub fn push(&mut self, altitude_m: f64) {
        let Some(previous) = self.previous_m.replace(altitude_m) else {
            return;
        };
        let delta = altitude_m - previous;
        if delta == 0.0 || delta.abs() < self.threshold_m {
            return;
        }
        if delta > 0.0 {
            self.ascent_m += delta;
        } else {
            self.descent_m -= delta;
        }
    }

    /// `None` until at least one altitude sample was seen.
    pub fn ascent(&self) -> Option<f64> {
        self.previous_m.map(|_| self.ascent_m)
    }

    pub fn descent(&self) -> Option<f64> {
        self.previous_m.map(|_| self.descent_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_below_threshold_is_discarded() {
        let mut tracker = ElevationTracker::new(1.0);
        for alt in [100.0, 100.4, 99.7, 100.2, 99.9] {
            tracker.push(alt);
        }
        assert_eq!(tracker.ascent(), Some(0.0));
        assert_eq!(tracker.descent(), Some(0.0));
    }

    #[test]
    fn sub_threshold_steps_never_add_up() {
        let mut tracker = ElevationTracker::new(1.0);
        for step in 0..=20 {
            tracker.push(100.0 + step as f64 * 0.5);
        }
        assert_eq!(tracker.ascent(), Some(0.0));

        tracker.push(112.0);
        assert_eq!(tracker.ascent(), Some(2.0));
    }

    #[test]
    fn climb_then_descent() {
        let mut tracker = ElevationTracker::new(1.0);
        for alt in [10.0, 15.0, 22.0, 18.0, 12.5] {
            tracker.push(alt);
        }
        assert_eq!(tracker.ascent(), Some(12.0));
        assert_eq!(tracker.descent(), Some(9.5));
    }

    #[test]
    fn no_samples_means_unknown() {
        let tracker = ElevationTracker::new(1.0);
        assert_eq!(tracker.ascent(), None);
    }
}
