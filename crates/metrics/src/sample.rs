#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Closed set of sensor streams the engine understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    HeartRate,
    Power,
    Cadence,
    Speed,
    Distance,
    Altitude,
    Temperature,
    Gradient,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::HeartRate,
        MetricKind::Power,
        MetricKind::Cadence,
        MetricKind::Speed,
        MetricKind::Distance,
        MetricKind::Altitude,
        MetricKind::Temperature,
        MetricKind::Gradient,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heartrate",
            MetricKind::Power => "power",
            MetricKind::Cadence => "cadence",
            MetricKind::Speed => "speed",
            MetricKind::Distance => "distance",
            MetricKind::Altitude => "altitude",
            MetricKind::Temperature => "temperature",
            MetricKind::Gradient => "gradient",
        }
    }

    /// Altitude, temperature and gradient can legitimately go below zero.
    pub fn allows_negative(self) -> bool {
        matches!(
            self,
            MetricKind::Altitude | MetricKind::Temperature | MetricKind::Gradient
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SampleError::UnknownMetric(s.to_owned()))
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceId").field(&self.0).finish()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single reading from a sensor or GPS producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub metric: MetricKind,
    pub value: f64,
    pub timestamp_ms: u64,
    pub source_id: SourceId,
}

impl SensorSample {
    pub fn new(
        metric: MetricKind,
        value: f64,
        timestamp_ms: u64,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            metric,
            value,
            timestamp_ms,
            source_id: SourceId::new(source_id),
        }
    }

    /// Reject values no sensor can produce.
    pub fn validate(&self) -> Result<(), SampleError> {
        validate_value(self.metric, self.value)
    }

    /// Reject timestamps more than `tolerance_ms` past `now_ms`, such as
    /// wall-clock epoch stamps fed to a monotonic session clock.
    pub fn check_not_ahead(&self, now_ms: u64, tolerance_ms: u64) -> Result<(), SampleError> {
        if self.timestamp_ms > now_ms.saturating_add(tolerance_ms) {
            return Err(SampleError::AheadOfClock {
                metric: self.metric,
                timestamp_ms: self.timestamp_ms,
                now_ms,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_value(metric: MetricKind, value: f64) -> Result<(), SampleError> {
    if !value.is_finite() {
        return Err(SampleError::NonFinite { metric, value });
    }
    if value < 0.0 && !metric.allows_negative() {
        return Err(SampleError::Negative { metric, value });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("{metric} value is not finite: {value}")]
    NonFinite { metric: MetricKind, value: f64 },

    #[error("{metric} value must not be negative: {value}")]
    Negative { metric: MetricKind, value: f64 },

    #[error("{metric} sample at {timestamp_ms} ms precedes the last accepted sample at {last_ms} ms")]
    OutOfOrder {
        metric: MetricKind,
        timestamp_ms: u64,
        last_ms: u64,
    },

    #[error("{metric} sample at {timestamp_ms} ms lies ahead of the clock at {now_ms} ms")]
    AheadOfClock {
        metric: MetricKind,
        timestamp_ms: u64,
        now_ms: u64,
    },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}
