#![forbid(unsafe_code)]

use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Zones {
    /// Upper bounds of power zones 1..6 as percentages of FTP (7 zones).
    pub power_boundaries_pct: Vec<f64>,
    /// Lower bounds of heart-rate zones 2..5 as percentages of threshold HR (5 zones).
    pub hr_boundaries_pct: Vec<f64>,
}

impl Default for Zones {
    fn default() -> Self {
        Self {
            power_boundaries_pct: vec![55.0, 75.0, 90.0, 105.0, 120.0, 150.0],
            hr_boundaries_pct: vec![85.0, 90.0, 95.0, 100.0],
        }
    }
}

impl Zones {
    pub fn power_zone_count(&self) -> usize {
        self.power_boundaries_pct.len() + 1
    }

    pub fn hr_zone_count(&self) -> usize {
        self.hr_boundaries_pct.len() + 1
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        check_boundaries("zones.power_boundaries_pct", &self.power_boundaries_pct)?;
        check_boundaries("zones.hr_boundaries_pct", &self.hr_boundaries_pct)
    }
}

fn check_boundaries(field: &'static str, boundaries: &[f64]) -> Result<(), Error> {
    if boundaries.is_empty() {
        return Err(Error::Invalid {
            field,
            reason: "at least one boundary is required".into(),
        });
    }
    if boundaries.iter().any(|b| !b.is_finite() || *b <= 0.0) {
        return Err(Error::Invalid {
            field,
            reason: "boundaries must be positive percentages".into(),
        });
    }
    if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::Invalid {
            field,
            reason: "boundaries must be strictly increasing".into(),
        });
    }
    Ok(())
}
