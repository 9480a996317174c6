#![forbid(unsafe_code)]

mod executor;

pub use executor::{PlanExecutionState, PlanExecutor, Position, StepState};
