#![forbid(unsafe_code)]

use crate::domain::{RecordingState, SessionId};
use crate::plan::StepState;
use metrics::{AggregatedStream, DerivedMetrics, MetricKind, RollingAggregator};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamSummary {
    pub count: u64,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl From<&AggregatedStream> for StreamSummary {
    fn from(stream: &AggregatedStream) -> Self {
        Self {
            count: stream.count,
            average: stream.average(),
            min: stream.min,
            max: stream.max,
        }
    }
}

/// Point-in-time view published with `metricsUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub session_id: SessionId,
    pub state: RecordingState,
    pub captured_at_ms: u64,
    pub elapsed_ms: u64,
    pub moving_ms: u64,
    /// Latest reading per metric, omitting stale sensors.
    pub current: BTreeMap<MetricKind, f64>,
    pub streams: BTreeMap<MetricKind, StreamSummary>,
    pub distance_m: Option<f64>,
    pub derived: DerivedMetrics,
    pub step: Option<StepState>,
    pub dropped_samples: u64,
    pub rejected_samples: u64,
}

impl MetricsSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        session_id: SessionId,
        state: RecordingState,
        captured_at_ms: u64,
        elapsed_ms: u64,
        moving_ms: u64,
        aggregator: &RollingAggregator,
        current: BTreeMap<MetricKind, f64>,
        step: Option<StepState>,
    ) -> Self {
        Self {
            session_id,
            state,
            captured_at_ms,
            elapsed_ms,
            moving_ms,
            current,
            streams: aggregator
                .streams()
                .map(|(metric, stream)| (metric, StreamSummary::from(stream)))
                .collect(),
            distance_m: aggregator.distance_m(),
            derived: DerivedMetrics::compute(aggregator, moving_ms),
            step,
            dropped_samples: 0,
            rejected_samples: 0,
        }
    }

    pub fn with_sample_counts(mut self, dropped: u64, rejected: u64) -> Self {
        self.dropped_samples = dropped;
        self.rejected_samples = rejected;
        self
    }

    pub fn average(&self, metric: MetricKind) -> Option<f64> {
        self.streams.get(&metric).and_then(|s| s.average)
    }
}
