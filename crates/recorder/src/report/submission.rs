#![forbid(unsafe_code)]

use crate::domain::{ActivityInfo, RecordingSession, SessionId};
use metrics::{DerivedMetrics, MetricKind, RollingAggregator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Final summary handed to the host once a finished session has been
/// re-aggregated from its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub session_id: SessionId,
    pub profile_id: String,
    pub activity: ActivityInfo,
    pub started_at_unix_ms: u64,
    pub ended_at_unix_ms: u64,
    pub elapsed_s: f64,
    pub moving_time_s: f64,
    pub distance_m: Option<f64>,
    pub averages: BTreeMap<MetricKind, f64>,
    pub maxima: BTreeMap<MetricKind, f64>,
    pub sample_counts: BTreeMap<MetricKind, u64>,
    pub derived: DerivedMetrics,
    pub plan_id: Option<String>,
    pub chunk_count: u32,
}

impl SubmissionPayload {
    pub fn assemble(
        session: &RecordingSession,
        moving_ms: u64,
        aggregator: &RollingAggregator,
        plan_id: Option<String>,
        chunk_count: u32,
    ) -> Self {
        let ended_at_ms = session.ended_at_ms.unwrap_or(session.started_at_ms);
        let ended_at = session.ended_at.unwrap_or(session.started_at);

        let mut averages = BTreeMap::new();
        let mut maxima = BTreeMap::new();
        let mut sample_counts = BTreeMap::new();
        for (metric, stream) in aggregator.streams() {
            if let Some(average) = stream.average() {
                averages.insert(metric, average);
            }
            if let Some(max) = stream.max {
                maxima.insert(metric, max);
            }
            sample_counts.insert(metric, stream.count);
        }

        Self {
            session_id: session.id,
            profile_id: session.profile_id.clone(),
            activity: session.activity.clone(),
            started_at_unix_ms: unix_ms(session.started_at),
            ended_at_unix_ms: unix_ms(ended_at),
            elapsed_s: ended_at_ms.saturating_sub(session.started_at_ms) as f64 / 1000.0,
            moving_time_s: moving_ms as f64 / 1000.0,
            distance_m: aggregator.distance_m(),
            averages,
            maxima,
            sample_counts,
            derived: DerivedMetrics::compute(aggregator, moving_ms),
            plan_id,
            chunk_count,
        }
    }
}

fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
