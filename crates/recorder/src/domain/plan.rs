#![forbid(unsafe_code)]

use metrics::{Calibration, MetricKind};
use serde::{Deserialize, Serialize};

/// How long a plan step lasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DurationSpec {
    Time { seconds: u64 },
    Distance { meters: f64 },
    Repetitions { count: u32 },
    UntilFinished,
}

impl DurationSpec {
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            DurationSpec::Time { seconds } => Some(seconds.saturating_mul(1_000)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "%FTP")]
    PercentFtp,
    #[serde(rename = "watts")]
    Watts,
    #[serde(rename = "%MaxHR")]
    PercentMaxHr,
    #[serde(rename = "%ThresholdHR")]
    PercentThresholdHr,
    #[serde(rename = "bpm")]
    Bpm,
    #[serde(rename = "cadence")]
    Cadence,
    #[serde(rename = "speed")]
    Speed,
    #[serde(rename = "RPE")]
    Rpe,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityTarget {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub intensity: f64,
}

/// A target expressed in the units of the stream it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedTarget {
    pub kind: TargetKind,
    /// `None` for perceived exertion, which has no sensor stream.
    pub metric: Option<MetricKind>,
    pub value: f64,
}

impl IntensityTarget {
    pub fn new(kind: TargetKind, intensity: f64) -> Self {
        Self { kind, intensity }
    }

    /// Resolves relative targets against the athlete's thresholds. Relative
    /// targets without the matching threshold resolve to `None`.
    pub fn resolve(&self, calibration: &Calibration) -> Option<ResolvedTarget> {
        let relative = |reference: Option<f64>| reference.map(|r| r * self.intensity / 100.0);
        let (metric, value) = match self.kind {
            TargetKind::PercentFtp => (Some(MetricKind::Power), relative(calibration.ftp())?),
            TargetKind::Watts => (Some(MetricKind::Power), self.intensity),
            TargetKind::PercentMaxHr => (
                Some(MetricKind::HeartRate),
                relative(calibration.max_hr())?,
            ),
            TargetKind::PercentThresholdHr => (
                Some(MetricKind::HeartRate),
                relative(calibration.threshold_hr())?,
            ),
            TargetKind::Bpm => (Some(MetricKind::HeartRate), self.intensity),
            TargetKind::Cadence => (Some(MetricKind::Cadence), self.intensity),
            TargetKind::Speed => (Some(MetricKind::Speed), self.intensity),
            TargetKind::Rpe => (None, self.intensity),
        };
        value.is_finite().then_some(ResolvedTarget {
            kind: self.kind,
            metric,
            value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub duration: DurationSpec,
    #[serde(default)]
    pub targets: Vec<IntensityTarget>,
}

impl PlanStep {
    pub fn new(name: impl Into<String>, duration: DurationSpec) -> Self {
        Self {
            name: name.into(),
            duration,
            targets: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: IntensityTarget) -> Self {
        self.targets.push(target);
        self
    }
}

/// A plan as authored: single steps and repeated blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlanItem {
    Step(PlanStep),
    Interval {
        repetitions: u32,
        steps: Vec<PlanStep>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStructure {
    pub id: String,
    pub items: Vec<PlanItem>,
}

impl PlanStructure {
    /// Expands repeated blocks into the linear step list the executor runs.
    pub fn flatten(&self) -> Vec<PlanStep> {
        let mut steps = Vec::new();
        for item in &self.items {
            match item {
                PlanItem::Step(step) => steps.push(step.clone()),
                PlanItem::Interval {
                    repetitions,
                    steps: block,
                } => {
                    for round in 1..=*repetitions {
                        steps.extend(block.iter().map(|step| {
                            let mut step = step.clone();
                            if *repetitions > 1 {
                                step.name = format!("{} ({round}/{repetitions})", step.name);
                            }
                            step
                        }));
                    }
                }
            }
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intervals_expand_in_order() {
        let plan = PlanStructure {
            id: "vo2".into(),
            items: vec![
                PlanItem::Step(PlanStep::new("Warmup", DurationSpec::Time { seconds: 600 })),
                PlanItem::Interval {
                    repetitions: 2,
                    steps: vec![
                        PlanStep::new("On", DurationSpec::Time { seconds: 180 }),
                        PlanStep::new("Off", DurationSpec::Time { seconds: 120 }),
                    ],
                },
                PlanItem::Step(PlanStep::new("Cooldown", DurationSpec::UntilFinished)),
            ],
        };

        let names: Vec<_> = plan.flatten().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "Warmup",
                "On (1/2)",
                "Off (1/2)",
                "On (2/2)",
                "Off (2/2)",
                "Cooldown"
            ]
        );
    }

    #[test]
    fn relative_targets_need_thresholds() {
        let calibration = Calibration {
            ftp_w: Some(250.0),
            ..Calibration::default()
        };
        let sweet_spot = IntensityTarget::new(TargetKind::PercentFtp, 90.0);
        let resolved = sweet_spot.resolve(&calibration);
        assert_eq!(resolved.map(|t| t.value), Some(225.0));
        assert_eq!(resolved.and_then(|t| t.metric), Some(MetricKind::Power));

        let hr = IntensityTarget::new(TargetKind::PercentThresholdHr, 95.0);
        assert_eq!(hr.resolve(&calibration), None);

        let rpe = IntensityTarget::new(TargetKind::Rpe, 7.0);
        assert_eq!(rpe.resolve(&calibration).map(|t| t.metric), Some(None));
    }

    #[test]
    fn plan_parses_from_json() {
        let json = r#"{
            "id": "tempo",
            "items": [
                {"type": "step", "name": "Ride", "duration": {"type": "distance", "meters": 5000.0},
                 "targets": [{"type": "%FTP", "intensity": 80.0}]},
                {"type": "interval", "repetitions": 3,
                 "steps": [{"name": "Sprint", "duration": {"type": "repetitions", "count": 1}}]}
            ]
        }"#;
        let plan: PlanStructure = serde_json::from_str(json).unwrap();
        let steps = plan.flatten();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].duration, DurationSpec::Distance { meters: 5000.0 });
        assert_eq!(steps[3].duration, DurationSpec::Repetitions { count: 1 });
    }
}
