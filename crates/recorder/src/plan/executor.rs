#![forbid(unsafe_code)]

use crate::domain::{DurationSpec, PlanStep, ResolvedTarget};
use crate::error::Error;
use metrics::Calibration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the athlete is, in the units plan steps are measured in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub moving_ms: u64,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanExecutionState {
    pub step_index: usize,
    pub step_started_at_moving_ms: u64,
    pub step_started_at_distance_m: f64,
    pub repetitions_done: u32,
    pub is_finished: bool,
}

/// The current step as published with `stepChanged`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepState {
    pub plan_id: String,
    pub step_index: usize,
    pub step_count: usize,
    pub step: PlanStep,
    pub targets: Vec<ResolvedTarget>,
    pub progress: Option<f64>,
    pub remaining_ms: Option<u64>,
    pub can_advance: bool,
    pub is_finished: bool,
}

#[derive(Debug, Clone)]
struct ActivePlan {
    id: String,
    steps: Arc<[PlanStep]>,
    state: PlanExecutionState,
}

impl ActivePlan {
    fn step(&self) -> &PlanStep {
        &self.steps[self.state.step_index]
    }

    fn elapsed_ms(&self, at: Position) -> u64 {
        at.moving_ms
            .saturating_sub(self.state.step_started_at_moving_ms)
    }

    fn covered_m(&self, at: Position) -> f64 {
        (at.distance_m - self.state.step_started_at_distance_m).max(0.0)
    }

    fn progress(&self, at: Position) -> Option<f64> {
        let fraction = match self.step().duration {
            DurationSpec::Time { seconds } => {
                let total = seconds.saturating_mul(1_000);
                if total == 0 {
                    1.0
                } else {
                    self.elapsed_ms(at) as f64 / total as f64
                }
            }
            DurationSpec::Distance { meters } => {
                if meters <= 0.0 {
                    1.0
                } else {
                    self.covered_m(at) / meters
                }
            }
            DurationSpec::Repetitions { .. } | DurationSpec::UntilFinished => return None,
        };
        Some(fraction.min(1.0))
    }

    fn can_advance(&self, at: Position) -> bool {
        match self.step().duration {
            DurationSpec::Time { .. } | DurationSpec::Distance { .. } => {
                self.progress(at).is_some_and(|p| p >= 1.0)
            }
            DurationSpec::Repetitions { count } => self.state.repetitions_done >= count,
            DurationSpec::UntilFinished => true,
        }
    }

    fn move_on(&mut self, at: Position) {
        if self.state.step_index + 1 < self.steps.len() {
            self.state = PlanExecutionState {
                step_index: self.state.step_index + 1,
                step_started_at_moving_ms: at.moving_ms,
                step_started_at_distance_m: at.distance_m,
                repetitions_done: 0,
                is_finished: false,
            };
        } else {
            self.state.is_finished = true;
        }
    }
}

/// Walks a flattened plan against moving time and distance.
#[derive(Debug, Clone, Default)]
pub struct PlanExecutor {
    calibration: Calibration,
    active: Option<ActivePlan>,
}

impl PlanExecutor {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            active: None,
        }
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    pub fn select(
        &mut self,
        plan_id: impl Into<String>,
        steps: Vec<PlanStep>,
        at: Position,
    ) -> Result<StepState, Error> {
        if self.active.is_some() {
            return Err(Error::PlanAlreadyActive);
        }
        if steps.is_empty() {
            return Err(Error::EmptyPlan);
        }
        let plan = ActivePlan {
            id: plan_id.into(),
            steps: steps.into(),
            state: PlanExecutionState {
                step_index: 0,
                step_started_at_moving_ms: at.moving_ms,
                step_started_at_distance_m: at.distance_m,
                repetitions_done: 0,
                is_finished: false,
            },
        };
        info!(plan = %plan.id, steps = plan.steps.len(), "plan selected");
        let state = self.describe(&plan, at);
        self.active = Some(plan);
        Ok(state)
    }

    pub fn clear(&mut self) -> Result<(), Error> {
        let plan = self.active.take().ok_or(Error::NoActivePlan)?;
        info!(plan = %plan.id, "plan cleared");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.active.as_ref().map(|plan| plan.id.as_str())
    }

    pub fn state(&self) -> Option<PlanExecutionState> {
        self.active.as_ref().map(|plan| plan.state)
    }

    pub fn step_state(&self, at: Position) -> Option<StepState> {
        self.active.as_ref().map(|plan| self.describe(plan, at))
    }

    pub fn progress(&self, at: Position) -> Option<f64> {
        self.active.as_ref().and_then(|plan| plan.progress(at))
    }

    pub fn can_advance(&self, at: Position) -> bool {
        self.active
            .as_ref()
            .is_some_and(|plan| !plan.state.is_finished && plan.can_advance(at))
    }

    /// Moves past a time or distance step once it is complete. At most one
    /// step is passed per call. Returns the new step when it changed.
    pub fn tick(&mut self, at: Position) -> Option<StepState> {
        let plan = self.active.as_mut()?;
        if plan.state.is_finished {
            return None;
        }
        let automatic = matches!(
            plan.step().duration,
            DurationSpec::Time { .. } | DurationSpec::Distance { .. }
        );
        if !(automatic && plan.can_advance(at)) {
            return None;
        }
        plan.move_on(at);
        debug!(step = plan.state.step_index, finished = plan.state.is_finished, "plan step completed");
        let plan = self.active.as_ref()?;
        Some(self.describe(plan, at))
    }

    /// Skips the current step regardless of its progress.
    pub fn advance(&mut self, at: Position) -> Result<Option<StepState>, Error> {
        let plan = self.active.as_mut().ok_or(Error::NoActivePlan)?;
        if plan.state.is_finished {
            return Ok(None);
        }
        plan.move_on(at);
        Ok(self.step_state(at))
    }

    /// Counts completed repetitions on a repetition step, moving on once the
    /// target is met. Ignored on other step kinds.
    pub fn record_repetitions(
        &mut self,
        count: u32,
        at: Position,
    ) -> Result<Option<StepState>, Error> {
        let plan = self.active.as_mut().ok_or(Error::NoActivePlan)?;
        if plan.state.is_finished {
            return Ok(None);
        }
        let DurationSpec::Repetitions { count: target } = plan.step().duration else {
            debug!(step = plan.state.step_index, "repetitions reported on a non-repetition step");
            return Ok(None);
        };
        plan.state.repetitions_done = plan.state.repetitions_done.saturating_add(count);
        if plan.state.repetitions_done < target {
            return Ok(None);
        }
        plan.move_on(at);
        Ok(self.step_state(at))
    }

    fn describe(&self, plan: &ActivePlan, at: Position) -> StepState {
        let step = plan.step();
        StepState {
            plan_id: plan.id.clone(),
            step_index: plan.state.step_index,
            step_count: plan.steps.len(),
            step: step.clone(),
            targets: step
                .targets
                .iter()
                .filter_map(|target| target.resolve(&self.calibration))
                .collect(),
            progress: plan.progress(at),
            remaining_ms: step
                .duration
                .duration_ms()
                .map(|total| total.saturating_sub(plan.elapsed_ms(at))),
            can_advance: !plan.state.is_finished && plan.can_advance(at),
            is_finished: plan.state.is_finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IntensityTarget, TargetKind};
    use pretty_assertions::assert_eq;

    fn at(moving_s: u64, distance_m: f64) -> Position {
        Position {
            moving_ms: moving_s * 1_000,
            distance_m,
        }
    }

    fn two_timed_steps() -> Vec<PlanStep> {
        vec![
            PlanStep::new("A", DurationSpec::Time { seconds: 60 }),
            PlanStep::new("B", DurationSpec::Time { seconds: 30 }),
        ]
    }

    #[test]
    fn timed_steps_advance_then_finish() {
        let mut executor = PlanExecutor::default();
        executor.select("p", two_timed_steps(), at(0, 0.0)).unwrap();

        assert_eq!(executor.tick(at(59, 0.0)), None);
        let step = executor.tick(at(61, 0.0)).unwrap();
        assert_eq!(step.step_index, 1);
        assert_eq!(
            executor.state().map(|s| s.step_started_at_moving_ms),
            Some(61_000)
        );

        assert_eq!(executor.tick(at(90, 0.0)), None);
        let done = executor.tick(at(91, 0.0)).unwrap();
        assert!(done.is_finished);
        assert_eq!(done.step_index, 1);
        assert_eq!(executor.tick(at(500, 0.0)), None);
    }

    #[test]
    fn only_one_step_is_passed_per_tick() {
        let mut executor = PlanExecutor::default();
        let steps = vec![
            PlanStep::new("A", DurationSpec::Time { seconds: 10 }),
            PlanStep::new("B", DurationSpec::Time { seconds: 10 }),
            PlanStep::new("C", DurationSpec::Time { seconds: 10 }),
        ];
        executor.select("p", steps, at(0, 0.0)).unwrap();
        let step = executor.tick(at(100, 0.0)).unwrap();
        assert_eq!(step.step_index, 1);
        assert_eq!(step.progress, Some(0.0));
    }

    #[test]
    fn distance_steps_track_covered_distance() {
        let mut executor = PlanExecutor::default();
        let steps = vec![
            PlanStep::new("Climb", DurationSpec::Distance { meters: 1_000.0 }),
            PlanStep::new("Rest", DurationSpec::UntilFinished),
        ];
        executor.select("p", steps, at(0, 2_000.0)).unwrap();
        assert_eq!(executor.progress(at(30, 2_500.0)), Some(0.5));
        assert!(executor.tick(at(40, 2_900.0)).is_none());
        let step = executor.tick(at(50, 3_000.0)).unwrap();
        assert_eq!(step.step.name, "Rest");
        assert_eq!(step.progress, None);
        assert!(step.can_advance);
        assert!(executor.tick(at(5_000, 90_000.0)).is_none());
    }

    #[test]
    fn repetitions_advance_on_count() {
        let mut executor = PlanExecutor::default();
        let steps = vec![
            PlanStep::new("Sprints", DurationSpec::Repetitions { count: 3 }),
            PlanStep::new("Spin", DurationSpec::Time { seconds: 60 }),
        ];
        executor.select("p", steps, at(0, 0.0)).unwrap();
        assert!(executor.tick(at(600, 0.0)).is_none());
        assert_eq!(executor.record_repetitions(2, at(10, 0.0)).unwrap(), None);
        assert!(!executor.can_advance(at(10, 0.0)));
        let step = executor.record_repetitions(1, at(20, 0.0)).unwrap().unwrap();
        assert_eq!(step.step_index, 1);
        assert_eq!(step.remaining_ms, Some(60_000));
    }

    #[test]
    fn explicit_advance_skips_incomplete_steps() {
        let mut executor = PlanExecutor::default();
        executor.select("p", two_timed_steps(), at(0, 0.0)).unwrap();
        let step = executor.advance(at(5, 0.0)).unwrap().unwrap();
        assert_eq!(step.step_index, 1);
        let step = executor.advance(at(6, 0.0)).unwrap().unwrap();
        assert!(step.is_finished);
        assert_eq!(executor.advance(at(7, 0.0)).unwrap(), None);
    }

    #[test]
    fn selection_rules() {
        let mut executor = PlanExecutor::default();
        assert!(matches!(
            executor.select("p", Vec::new(), at(0, 0.0)),
            Err(Error::EmptyPlan)
        ));
        assert!(matches!(executor.clear(), Err(Error::NoActivePlan)));
        assert!(matches!(
            executor.advance(at(0, 0.0)),
            Err(Error::NoActivePlan)
        ));

        executor.select("p", two_timed_steps(), at(0, 0.0)).unwrap();
        assert!(matches!(
            executor.select("q", two_timed_steps(), at(0, 0.0)),
            Err(Error::PlanAlreadyActive)
        ));
        executor.clear().unwrap();
        assert!(!executor.is_active());
        executor.select("q", two_timed_steps(), at(0, 0.0)).unwrap();
        assert_eq!(executor.plan_id(), Some("q"));
    }

    #[test]
    fn targets_resolve_against_calibration() {
        let mut executor = PlanExecutor::new(Calibration {
            ftp_w: Some(300.0),
            ..Calibration::default()
        });
        let steps = vec![
            PlanStep::new("Threshold", DurationSpec::Time { seconds: 1_200 })
                .with_target(IntensityTarget::new(TargetKind::PercentFtp, 100.0))
                .with_target(IntensityTarget::new(TargetKind::PercentMaxHr, 90.0)),
        ];
        let state = executor.select("p", steps, at(0, 0.0)).unwrap();
        assert_eq!(state.targets.len(), 1);
        assert_eq!(state.targets[0].value, 300.0);
    }
}
