#![forbid(unsafe_code)]

mod gate;
mod machine;

pub use gate::{SessionGate, SessionLease};
pub use machine::{RecordingStateMachine, Transition};
