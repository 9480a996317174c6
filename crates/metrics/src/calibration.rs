#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Athlete thresholds the derived metrics are normalised against.
///
/// Absent or non-positive values mean "not calibrated": anything depending on
/// them is reported as `None` rather than guessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub ftp_w: Option<f64>,
    pub threshold_hr_bpm: Option<f64>,
    pub max_hr_bpm: Option<f64>,
}

impl Calibration {
    pub fn ftp(&self) -> Option<f64> {
        usable(self.ftp_w)
    }

    pub fn threshold_hr(&self) -> Option<f64> {
        usable(self.threshold_hr_bpm)
    }

    pub fn max_hr(&self) -> Option<f64> {
        usable(self.max_hr_bpm)
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ftp_counts_as_missing() {
        let calibration = Calibration {
            ftp_w: Some(0.0),
            threshold_hr_bpm: Some(168.0),
            max_hr_bpm: None,
        };
        assert_eq!(calibration.ftp(), None);
        assert_eq!(calibration.threshold_hr(), Some(168.0));
    }
}
