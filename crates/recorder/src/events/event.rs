#![forbid(unsafe_code)]

use crate::domain::{RecordingState, SessionId};
use crate::error::{Error, ErrorKind};
use crate::plan::StepState;
use crate::report::MetricsSnapshot;
use metrics::SourceId;
use std::sync::Arc;

/// Notifications published to every subscriber, in emission order.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    StateChanged(RecordingState),
    MetricsUpdate(Arc<MetricsSnapshot>),
    StepChanged(StepState),
    PlanCleared,
    SensorsChanged(Vec<SourceId>),
    RecordingComplete { session_id: SessionId },
    Error { kind: ErrorKind, message: String },
}

impl RecorderEvent {
    pub fn from_error(error: &Error) -> Self {
        RecorderEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
