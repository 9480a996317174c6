#![forbid(unsafe_code)]

use itertools::Itertools;

/// Absolute zone boundaries derived from a reference threshold.
///
/// `n` boundaries give `n + 1` zones. A value equal to a boundary belongs to
/// the upper zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneModel {
    bounds: Vec<f64>,
}

impl ZoneModel {
    /// Build zones from percentages of `reference` (FTP or threshold HR).
    ///
    /// Returns `None` when the reference is unusable or the percentages are
    /// not strictly increasing.
    pub fn from_percentages(reference: f64, boundaries_pct: &[f64]) -> Option<Self> {
        if !reference.is_finite() || reference <= 0.0 || boundaries_pct.is_empty() {
            return None;
        }
        if !boundaries_pct.iter().tuple_windows().all(|(a, b)| a < b) {
            return None;
        }
        let bounds = boundaries_pct
            .iter()
            .map(|pct| reference * pct / 100.0)
            .collect();
        Some(Self { bounds })
    }

    pub fn zone_count(&self) -> usize {
        self.bounds.len() + 1
    }

    /// Zero-based zone index for `value`.
    pub fn classify(&self, value: f64) -> usize {
        self.bounds.partition_point(|bound| *bound <= value)
    }
}

/// Milliseconds spent in each zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneTime {
    buckets_ms: Vec<u64>,
}

impl ZoneTime {
    pub fn new(zones: usize) -> Self {
        Self {
            buckets_ms: vec![0; zones],
        }
    }

    pub fn add(&mut self, zone: usize, duration_ms: u64) {
        if let Some(bucket) = self.buckets_ms.get_mut(zone) {
            *bucket += duration_ms;
        }
    }

    pub fn buckets_ms(&self) -> &[u64] {
        &self.buckets_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.buckets_ms.iter().sum()
    }

    pub fn as_seconds(&self) -> Vec<f64> {
        self.buckets_ms.iter().map(|ms| *ms as f64 / 1000.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWER_PCT: [f64; 6] = [55.0, 75.0, 90.0, 105.0, 120.0, 150.0];

    #[test]
    fn classifies_power_against_ftp() {
        let zones = ZoneModel::from_percentages(200.0, &POWER_PCT).unwrap();
        assert_eq!(zones.zone_count(), 7);
        assert_eq!(zones.classify(0.0), 0);
        assert_eq!(zones.classify(109.9), 0);
        assert_eq!(zones.classify(110.0), 1);
        assert_eq!(zones.classify(200.0), 3);
        assert_eq!(zones.classify(1200.0), 6);
    }

    #[test]
    fn rejects_missing_reference() {
        assert!(ZoneModel::from_percentages(0.0, &POWER_PCT).is_none());
        assert!(ZoneModel::from_percentages(f64::NAN, &POWER_PCT).is_none());
        assert!(ZoneModel::from_percentages(250.0, &[90.0, 80.0]).is_none());
    }

    #[test]
    fn zone_time_ignores_out_of_range_zone() {
        let mut time = ZoneTime::new(5);
        time.add(2, 1_000);
        time.add(9, 1_000);
        assert_eq!(time.total_ms(), 1_000);
        assert_eq!(time.as_seconds(), vec![0.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
