#![forbid(unsafe_code)]

use crate::calibration::Calibration;
use crate::decoupling::DecouplingBins;
use crate::elevation::ElevationTracker;
use crate::sample::{MetricKind, SampleError, SensorSample, validate_value};
use crate::stream::AggregatedStream;
use crate::window::RollingWindow;
use crate::zones::{ZoneModel, ZoneTime};
use config::Config;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// The subset of [`Config`] the aggregator depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    pub np_window: Duration,
    pub elevation_threshold_m: f64,
    pub decoupling_bin: Duration,
    pub power_boundaries_pct: Vec<f64>,
    pub hr_boundaries_pct: Vec<f64>,
}

impl AggregatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            np_window: config.metrics.np_window,
            elevation_threshold_m: config.metrics.elevation_threshold_m,
            decoupling_bin: config.metrics.decoupling_bin,
            power_boundaries_pct: config.zones.power_boundaries_pct.clone(),
            hr_boundaries_pct: config.zones.hr_boundaries_pct.clone(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Zoned {
    model: ZoneModel,
    time: ZoneTime,
}

impl Zoned {
    fn new(reference: Option<f64>, boundaries_pct: &[f64]) -> Option<Self> {
        let model = ZoneModel::from_percentages(reference?, boundaries_pct)?;
        let time = ZoneTime::new(model.zone_count());
        Some(Self { model, time })
    }

    fn record(&mut self, value: f64, duration_ms: u64) {
        let zone = self.model.classify(value);
        self.time.add(zone, duration_ms);
    }
}

/// Running per-metric statistics for a session.
///
/// Owned by the single ingestion consumer. Folding the same samples in the
/// same per-metric order always yields an equal aggregator, which is what
/// lets durable chunks be re-aggregated at submission time.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAggregator {
    settings: AggregatorSettings,
    calibration: Calibration,
    streams: BTreeMap<MetricKind, AggregatedStream>,
    power_zones: Option<Zoned>,
    hr_zones: Option<Zoned>,
    elevation: ElevationTracker,
    decoupling: DecouplingBins,
}

impl RollingAggregator {
    pub fn new(settings: AggregatorSettings, calibration: Calibration) -> Self {
        let power_zones = Zoned::new(calibration.ftp(), &settings.power_boundaries_pct);
        let hr_zones = Zoned::new(calibration.threshold_hr(), &settings.hr_boundaries_pct);
        Self {
            elevation: ElevationTracker::new(settings.elevation_threshold_m),
            decoupling: DecouplingBins::new(settings.decoupling_bin),
            streams: BTreeMap::new(),
            power_zones,
            hr_zones,
            calibration,
            settings,
        }
    }

    /// Fold a sensor sample. `moving_ms` is the session moving time at the
    /// sample, `None` while paused.
    pub fn ingest(&mut self, sample: &SensorSample, moving_ms: Option<u64>) -> Result<(), SampleError> {
        self.apply(sample.metric, sample.value, sample.timestamp_ms, moving_ms)
    }

    pub fn apply(
        &mut self,
        metric: MetricKind,
        value: f64,
        timestamp_ms: u64,
        moving_ms: Option<u64>,
    ) -> Result<(), SampleError> {
        validate_value(metric, value)?;
        if let Some(last_ms) = self.streams.get(&metric).and_then(|s| s.last_timestamp_ms)
            && timestamp_ms < last_ms
        {
            return Err(SampleError::OutOfOrder {
                metric,
                timestamp_ms,
                last_ms,
            });
        }

        let np_window = self.settings.np_window;
        let stream = self.streams.entry(metric).or_insert_with(|| match metric {
            MetricKind::Power => AggregatedStream::with_window(RollingWindow::new(np_window)),
            _ => AggregatedStream::new(),
        });
        let dt = stream.push(value, timestamp_ms);

        match metric {
            MetricKind::Power => {
                if let (Some(zones), Some(dt)) = (self.power_zones.as_mut(), dt) {
                    zones.record(value, dt);
                }
                if let Some(moving) = moving_ms {
                    self.decoupling.push_power(moving, value);
                }
            }
            MetricKind::HeartRate => {
                if let (Some(zones), Some(dt)) = (self.hr_zones.as_mut(), dt) {
                    zones.record(value, dt);
                }
                if let Some(moving) = moving_ms {
                    self.decoupling.push_heart_rate(moving, value);
                }
            }
            MetricKind::Altitude => self.elevation.push(value),
            MetricKind::Cadence
            | MetricKind::Speed
            | MetricKind::Distance
            | MetricKind::Temperature
            | MetricKind::Gradient => {}
        }

        trace!(%metric, value, timestamp_ms, "sample aggregated");
        Ok(())
    }

    pub fn stream(&self, metric: MetricKind) -> Option<&AggregatedStream> {
        self.streams.get(&metric)
    }

    pub fn streams(&self) -> impl Iterator<Item = (MetricKind, &AggregatedStream)> {
        self.streams.iter().map(|(kind, stream)| (*kind, stream))
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// `None` when FTP is not calibrated.
    pub fn power_zone_time(&self) -> Option<&ZoneTime> {
        self.power_zones.as_ref().map(|z| &z.time)
    }

    /// `None` when threshold heart rate is not calibrated.
    pub fn hr_zone_time(&self) -> Option<&ZoneTime> {
        self.hr_zones.as_ref().map(|z| &z.time)
    }

    pub fn elevation(&self) -> &ElevationTracker {
        &self.elevation
    }

    pub fn decoupling_bins(&self) -> &DecouplingBins {
        &self.decoupling
    }

    /// Latest cumulative distance in metres.
    pub fn distance_m(&self) -> Option<f64> {
        self.stream(MetricKind::Distance).and_then(|s| s.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn calibrated() -> Calibration {
        Calibration {
            ftp_w: Some(250.0),
            threshold_hr_bpm: Some(170.0),
            max_hr_bpm: None,
        }
    }

    #[test]
    fn out_of_order_sample_is_rejected() {
        let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibrated());
        agg.apply(MetricKind::Power, 200.0, 5_000, Some(5_000)).unwrap();
        let err = agg.apply(MetricKind::Power, 210.0, 4_000, Some(4_000)).unwrap_err();
        assert!(matches!(err, SampleError::OutOfOrder { last_ms: 5_000, .. }));
        assert_eq!(agg.stream(MetricKind::Power).unwrap().count, 1);
        // other metrics keep their own ordering
        agg.apply(MetricKind::HeartRate, 120.0, 4_000, Some(4_000)).unwrap();
    }

    #[test]
    fn zones_are_absent_without_calibration() {
        let mut agg = RollingAggregator::new(AggregatorSettings::default(), Calibration::default());
        for s in 0..10u64 {
            agg.apply(MetricKind::Power, 200.0, s * 1000, Some(s * 1000)).unwrap();
            agg.apply(MetricKind::HeartRate, 150.0, s * 1000, Some(s * 1000)).unwrap();
        }
        assert!(agg.power_zone_time().is_none());
        assert!(agg.hr_zone_time().is_none());
    }

    #[test]
    fn zone_time_uses_sample_spacing() {
        let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibrated());
        // 100 W is zone 1, 260 W is zone 4 at FTP 250
        agg.apply(MetricKind::Power, 100.0, 0, Some(0)).unwrap();
        agg.apply(MetricKind::Power, 100.0, 1_000, Some(1_000)).unwrap();
        agg.apply(MetricKind::Power, 260.0, 4_000, Some(4_000)).unwrap();
        let zones = agg.power_zone_time().unwrap();
        assert_eq!(zones.buckets_ms(), &[1_000, 0, 0, 3_000, 0, 0, 0]);
    }

    #[test]
    fn paused_samples_skip_decoupling_but_not_totals() {
        let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibrated());
        agg.apply(MetricKind::Power, 200.0, 0, None).unwrap();
        agg.apply(MetricKind::HeartRate, 140.0, 0, None).unwrap();
        assert_eq!(agg.stream(MetricKind::Power).unwrap().count, 1);
        assert_eq!(agg.decoupling_bins().decoupling(10_000), None);
    }

    fn independent_reduction(values: &[f64]) -> (u64, f64, f64, f64) {
        let count = values.len() as u64;
        let sum = values.iter().fold(0.0, |acc, v| acc + v);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (count, sum, min, max)
    }

    proptest! {
        #[test]
        fn stream_matches_independent_reduction(
            values in prop::collection::vec(0.0f64..2000.0, 1..300),
            gaps in prop::collection::vec(0u64..5_000, 300),
        ) {
            let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibrated());
            let mut t = 0u64;
            for (value, gap) in values.iter().zip(&gaps) {
                t += gap;
                agg.apply(MetricKind::Power, *value, t, Some(t)).unwrap();
            }
            let stream = agg.stream(MetricKind::Power).unwrap();
            let (count, sum, min, max) = independent_reduction(&values);
            prop_assert_eq!(stream.count, count);
            prop_assert_eq!(stream.sum, sum);
            prop_assert_eq!(stream.min, Some(min));
            prop_assert_eq!(stream.max, Some(max));
            prop_assert_eq!(stream.last, values.last().copied());
        }

        #[test]
        fn zone_time_sums_to_stream_span(
            values in prop::collection::vec(40.0f64..220.0, 1..300),
            gaps in prop::collection::vec(0u64..30_000, 300),
        ) {
            let mut agg = RollingAggregator::new(AggregatorSettings::default(), calibrated());
            let mut t = 1_000u64;
            for (value, gap) in values.iter().zip(&gaps) {
                t += gap;
                agg.apply(MetricKind::HeartRate, *value, t, Some(t)).unwrap();
            }
            let span = agg.stream(MetricKind::HeartRate).unwrap().span_ms();
            prop_assert_eq!(agg.hr_zone_time().unwrap().total_ms(), span);
        }
    }
}
