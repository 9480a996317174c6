#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bin {
    power_sum: f64,
    power_count: u64,
    hr_sum: f64,
    hr_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Half {
    power_sum: f64,
    power_count: u64,
    hr_sum: f64,
    hr_count: u64,
}

impl Half {
    fn absorb(&mut self, bin: &Bin) {
        self.power_sum += bin.power_sum;
        self.power_count += bin.power_count;
        self.hr_sum += bin.hr_sum;
        self.hr_count += bin.hr_count;
    }

    fn ratio(&self) -> Option<f64> {
        if self.power_count == 0 || self.hr_count == 0 {
            return None;
        }
        let hr = self.hr_sum / self.hr_count as f64;
        if hr <= 0.0 {
            return None;
        }
        Some((self.power_sum / self.power_count as f64) / hr)
    }
}

/// Power and heart rate binned by moving time, so the session can be split
/// into halves at any point without keeping every sample. Only bins that
/// received a sample are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DecouplingBins {
    bin_ms: u64,
    bins: BTreeMap<u64, Bin>,
}

impl DecouplingBins {
    pub fn new(bin: Duration) -> Self {
        Self {
            bin_ms: (bin.as_millis() as u64).max(1),
            bins: BTreeMap::new(),
        }
    }

    fn bin_mut(&mut self, moving_ms: u64) -> &mut Bin {
        self.bins.entry(moving_ms / self.bin_ms).or_default()
    }

    pub fn push_power(&mut self, moving_ms: u64, watts: f64) {
        let bin = self.bin_mut(moving_ms);
        bin.power_sum += watts;
        bin.power_count += 1;
    }

    pub fn push_heart_rate(&mut self, moving_ms: u64, bpm: f64) {
        let bin = self.bin_mut(moving_ms);
        bin.hr_sum += bpm;
        bin.hr_count += 1;
    }

    /// Percentage drop of the power:HR ratio from the first to the second
    /// half of `moving_ms`. Positive values mean the heart worked harder for
    /// the same output later on.
    pub fn decoupling(&self, moving_ms: u64) -> Option<f64> {
        let mid = moving_ms / 2;
        let mut first = Half::default();
        let mut second = Half::default();
        for (index, bin) in &self.bins {
            if index.saturating_mul(self.bin_ms) < mid {
                first.absorb(bin);
            } else {
                second.absorb(bin);
            }
        }
        let r1 = first.ratio()?;
        let r2 = second.ratio()?;
        if r1 <= 0.0 {
            return None;
        }
        Some((r1 - r2) / r1 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_effort_has_no_drift() {
        let mut bins = DecouplingBins::new(Duration::from_secs(1));
        for s in 0..600u64 {
            bins.push_power(s * 1000, 200.0);
            bins.push_heart_rate(s * 1000, 140.0);
        }
        let drift = bins.decoupling(600_000).unwrap();
        assert!(drift.abs() < 1e-9);
    }

    #[test]
    fn rising_heart_rate_is_positive_drift() {
        let mut bins = DecouplingBins::new(Duration::from_secs(1));
        for s in 0..600u64 {
            bins.push_power(s * 1000, 200.0);
            let hr = if s < 300 { 100.0 } else { 125.0 };
            bins.push_heart_rate(s * 1000, hr);
        }
        // 2.0 -> 1.6
        let drift = bins.decoupling(600_000).unwrap();
        assert!((drift - 20.0).abs() < 1e-9);
    }

    #[test]
    fn missing_stream_in_a_half_is_undefined() {
        let mut bins = DecouplingBins::new(Duration::from_secs(1));
        for s in 0..600u64 {
            bins.push_power(s * 1000, 200.0);
            if s < 300 {
                bins.push_heart_rate(s * 1000, 140.0);
            }
        }
        assert_eq!(bins.decoupling(600_000), None);
    }

    #[test]
    fn distant_bins_stay_sparse() {
        let mut bins = DecouplingBins::new(Duration::from_secs(1));
        bins.push_power(0, 200.0);
        bins.push_heart_rate(0, 140.0);
        bins.push_power(u64::MAX, 200.0);
        bins.push_heart_rate(u64::MAX, 140.0);
        assert_eq!(bins.bins.len(), 2);
        assert_eq!(bins.decoupling(u64::MAX), Some(0.0));
    }
}
