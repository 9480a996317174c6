#![forbid(unsafe_code)]

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Recording {
    /// Interval between metrics snapshots, in seconds.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub tick_interval: Duration,

    /// Capacity of the ingestion queue. The oldest sample is dropped when full.
    pub queue_capacity: usize,

    /// Samples older than this are hidden from "current reading" values.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub stale_after: Duration,

    /// Keep emitting snapshots while the session is paused.
    pub emit_while_paused: bool,

    /// How far past the engine clock a sample timestamp may lie before the
    /// sample is rejected.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub future_tolerance: Duration,
}

impl Default for Recording {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            queue_capacity: 1024,
            stale_after: Duration::from_secs(5),
            emit_while_paused: true,
            future_tolerance: Duration::from_secs(10),
        }
    }
}

impl Recording {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.tick_interval.is_zero() {
            return Err(Error::Invalid {
                field: "recording.tick_interval",
                reason: "must be at least one second".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(Error::Invalid {
                field: "recording.queue_capacity",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
