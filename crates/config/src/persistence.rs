#![forbid(unsafe_code)]

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::{path::PathBuf, time::Duration};

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persistence {
    /// Optional path to the chunk database. Chunks stay in memory when unset.
    pub store_path: Option<PathBuf>,

    /// Time-based flush cadence, in seconds.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub flush_interval: Duration,

    /// Size-based flush trigger: pending samples across all metrics.
    pub flush_max_samples: usize,

    /// Write attempts per chunk before it is parked in the backlog.
    pub write_attempts: u32,

    /// Delay between write attempts, in milliseconds.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub write_backoff: Duration,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            store_path: None,
            flush_interval: Duration::from_secs(10),
            flush_max_samples: 600,
            write_attempts: 3,
            write_backoff: Duration::from_millis(250),
        }
    }
}

impl Persistence {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.flush_interval.is_zero() {
            return Err(Error::Invalid {
                field: "persistence.flush_interval",
                reason: "must be at least one second".into(),
            });
        }
        if self.flush_max_samples == 0 {
            return Err(Error::Invalid {
                field: "persistence.flush_max_samples",
                reason: "must be positive".into(),
            });
        }
        if self.write_attempts == 0 {
            return Err(Error::Invalid {
                field: "persistence.write_attempts",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
