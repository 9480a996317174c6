#![forbid(unsafe_code)]

mod plan;
mod profile;
mod session;

pub use plan::{
    DurationSpec, IntensityTarget, PlanItem, PlanStep, PlanStructure, ResolvedTarget, TargetKind,
};
pub use profile::Profile;
pub use session::{ActivityInfo, RecordingSession, RecordingState, SessionId};
