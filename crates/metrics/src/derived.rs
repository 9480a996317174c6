#![forbid(unsafe_code)]

//! Derived training metrics.
//!
//! Every function is pure and returns `None` when its inputs are missing, so
//! "not computable yet" never collapses into a measured zero.

use crate::aggregator::RollingAggregator;
use crate::decoupling::DecouplingBins;
use crate::sample::MetricKind;
use crate::stream::AggregatedStream;
use serde::{Deserialize, Serialize};

/// Normalized power of the power stream. `None` until one full window of
/// power data exists.
pub fn normalized_power(power: &AggregatedStream) -> Option<f64> {
    power.window()?.normalized()
}

/// IF = NP / FTP
pub fn intensity_factor(np: Option<f64>, ftp: Option<f64>) -> Option<f64> {
    match (np, ftp) {
        (Some(np), Some(ftp)) if ftp > 0.0 => Some(np / ftp),
        _ => None,
    }
}

/// TSS = (seconds × NP × IF) / (FTP × 3600) × 100
pub fn training_stress_score(
    duration_s: f64,
    np: Option<f64>,
    intensity: Option<f64>,
    ftp: Option<f64>,
) -> Option<f64> {
    match (np, intensity, ftp) {
        (Some(np), Some(intensity), Some(ftp)) if ftp > 0.0 && duration_s >= 0.0 => {
            Some(duration_s * np * intensity / (ftp * 3600.0) * 100.0)
        }
        _ => None,
    }
}

/// VI = NP / average power
pub fn variability_index(np: Option<f64>, avg_power: Option<f64>) -> Option<f64> {
    match (np, avg_power) {
        (Some(np), Some(avg)) if avg > 0.0 => Some(np / avg),
        _ => None,
    }
}

/// EF = NP / average heart rate
pub fn efficiency_factor(np: Option<f64>, avg_hr: Option<f64>) -> Option<f64> {
    match (np, avg_hr) {
        (Some(np), Some(hr)) if hr > 0.0 => Some(np / hr),
        _ => None,
    }
}

pub fn decoupling(bins: &DecouplingBins, moving_ms: u64) -> Option<f64> {
    if moving_ms == 0 {
        return None;
    }
    bins.decoupling(moving_ms)
}

/// Grade in percent for a rise over a horizontal run.
pub fn grade(rise_m: f64, run_m: f64) -> Option<f64> {
    if run_m > 0.0 && rise_m.is_finite() {
        Some(rise_m / run_m * 100.0)
    } else {
        None
    }
}

/// Mean of the gradient stream when a sensor reports it, otherwise the net
/// altitude change over the distance covered.
pub fn average_grade(
    gradient: Option<&AggregatedStream>,
    altitude: Option<&AggregatedStream>,
    distance: Option<&AggregatedStream>,
) -> Option<f64> {
    if let Some(avg) = gradient.and_then(AggregatedStream::average) {
        return Some(avg);
    }
    let altitude = altitude?;
    let distance = distance?;
    let rise = altitude.last? - altitude.first?;
    let run = distance.max? - distance.first?;
    grade(rise, run)
}

/// Everything derived from the aggregator at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub normalized_power: Option<f64>,
    pub intensity_factor: Option<f64>,
    pub training_stress_score: Option<f64>,
    pub variability_index: Option<f64>,
    pub efficiency_factor: Option<f64>,
    pub decoupling_pct: Option<f64>,
    pub ascent_m: Option<f64>,
    pub descent_m: Option<f64>,
    pub average_grade_pct: Option<f64>,
    pub hr_zone_ms: Option<Vec<u64>>,
    pub power_zone_ms: Option<Vec<u64>>,
}

impl DerivedMetrics {
    pub fn compute(aggregator: &RollingAggregator, moving_ms: u64) -> Self {
        let ftp = aggregator.calibration().ftp();
        let power = aggregator.stream(MetricKind::Power);
        let avg_power = power.and_then(AggregatedStream::average);
        let avg_hr = aggregator
            .stream(MetricKind::HeartRate)
            .and_then(AggregatedStream::average);

        let np = power.and_then(normalized_power);
        let intensity = intensity_factor(np, ftp);
        let duration_s = moving_ms as f64 / 1000.0;

        Self {
            normalized_power: np,
            intensity_factor: intensity,
            training_stress_score: training_stress_score(duration_s, np, intensity, ftp),
            variability_index: variability_index(np, avg_power),
            efficiency_factor: efficiency_factor(np, avg_hr),
            decoupling_pct: decoupling(aggregator.decoupling_bins(), moving_ms),
            ascent_m: aggregator.elevation().ascent(),
            descent_m: aggregator.elevation().descent(),
            average_grade_pct: average_grade(
                aggregator.stream(MetricKind::Gradient),
                aggregator.stream(MetricKind::Altitude),
                aggregator.stream(MetricKind::Distance),
            ),
            hr_zone_ms: aggregator.hr_zone_time().map(|z| z.buckets_ms().to_vec()),
            power_zone_ms: aggregator.power_zone_time().map(|z| z.buckets_ms().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorSettings;
    use crate::calibration::Calibration;

    fn constant_power(seconds: u64, watts: f64, ftp: Option<f64>) -> RollingAggregator {
        let calibration = Calibration {
            ftp_w: ftp,
            ..Calibration::default()
        };
        let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibration);
        for s in 0..=seconds {
            agg.apply(MetricKind::Power, watts, s * 1000, Some(s * 1000)).unwrap();
        }
        agg
    }

    #[test]
    fn np_is_undefined_before_full_window() {
        let agg = constant_power(29, 200.0, Some(250.0));
        let derived = DerivedMetrics::compute(&agg, 29_000);
        assert_eq!(derived.normalized_power, None);
        assert_eq!(derived.intensity_factor, None);
        assert_eq!(derived.training_stress_score, None);
    }

    #[test]
    fn one_hour_at_ftp_scores_one_hundred() {
        let agg = constant_power(3600, 250.0, Some(250.0));
        let derived = DerivedMetrics::compute(&agg, 3_600_000);
        let np = derived.normalized_power.unwrap();
        assert!((np - 250.0).abs() < 1e-6);
        assert!((derived.intensity_factor.unwrap() - 1.0).abs() < 1e-9);
        assert!((derived.training_stress_score.unwrap() - 100.0).abs() < 1e-6);
        assert!((derived.variability_index.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_ftp_leaves_power_relative_metrics_empty() {
        let agg = constant_power(120, 180.0, None);
        let derived = DerivedMetrics::compute(&agg, 120_000);
        assert!(derived.normalized_power.is_some());
        assert_eq!(derived.intensity_factor, None);
        assert_eq!(derived.training_stress_score, None);
        assert_eq!(derived.power_zone_ms, None);
        assert!(derived.variability_index.is_some());
    }

    #[test]
    fn grade_prefers_gradient_sensor() {
        let mut gradient = AggregatedStream::new();
        gradient.push(4.0, 0);
        gradient.push(6.0, 1000);
        let mut altitude = AggregatedStream::new();
        altitude.push(100.0, 0);
        altitude.push(150.0, 1000);
        let mut distance = AggregatedStream::new();
        distance.push(0.0, 0);
        distance.push(1000.0, 1000);

        assert_eq!(average_grade(Some(&gradient), Some(&altitude), Some(&distance)), Some(5.0));
        assert_eq!(average_grade(None, Some(&altitude), Some(&distance)), Some(5.0));
        assert_eq!(average_grade(None, Some(&altitude), None), None);
    }

    #[test]
    fn ratios_guard_against_zero_denominators() {
        assert_eq!(variability_index(Some(200.0), Some(0.0)), None);
        assert_eq!(efficiency_factor(Some(200.0), None), None);
        assert_eq!(intensity_factor(Some(200.0), Some(0.0)), None);
        assert_eq!(grade(10.0, 0.0), None);
    }
}
