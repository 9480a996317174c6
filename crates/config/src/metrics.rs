#![forbid(unsafe_code)]

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Metrics {
    /// Rolling window used for normalized power.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub np_window: Duration,

    /// Altitude changes smaller than this (metres) count as sensor drift.
    pub elevation_threshold_m: f64,

    /// Moving-time bin width used to split the session for decoupling.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub decoupling_bin: Duration,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            np_window: Duration::from_secs(30),
            elevation_threshold_m: 1.0,
            decoupling_bin: Duration::from_secs(1),
        }
    }
}

impl Metrics {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.np_window.is_zero() {
            return Err(Error::Invalid {
                field: "metrics.np_window",
                reason: "must be at least one second".into(),
            });
        }
        if !self.elevation_threshold_m.is_finite() || self.elevation_threshold_m < 0.0 {
            return Err(Error::Invalid {
                field: "metrics.elevation_threshold_m",
                reason: format!("{} is not a non-negative number", self.elevation_threshold_m),
            });
        }
        if self.decoupling_bin.is_zero() {
            return Err(Error::Invalid {
                field: "metrics.decoupling_bin",
                reason: "must be at least one second".into(),
            });
        }
        Ok(())
    }
}
