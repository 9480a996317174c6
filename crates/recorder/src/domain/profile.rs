#![forbid(unsafe_code)]

use metrics::Calibration;
use serde::{Deserialize, Serialize};

/// The athlete a session is recorded for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub calibration: Calibration,
}

impl Profile {
    pub fn new(id: impl Into<String>, calibration: Calibration) -> Self {
        Self {
            id: id.into(),
            calibration,
        }
    }
}
